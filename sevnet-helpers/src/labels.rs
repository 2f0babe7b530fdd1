use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors that can occur when constructing a [`LabelSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum LabelSetError {
    /// A label set must contain at least one name.
    Empty,
    /// The same name appears more than once in the enumeration.
    DuplicateName(String),
    /// Label indices are stored as `u8` downstream, so at most 256 names fit.
    TooManyNames(usize),
}

impl Display for LabelSetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelSetError::Empty => write!(f, "A label set must contain at least one name"),
            LabelSetError::DuplicateName(name) => {
                write!(f, "Duplicate label name in enumeration: {}", name)
            }
            LabelSetError::TooManyNames(n) => {
                write!(f, "A label set supports at most 256 names, got {}", n)
            }
        }
    }
}

impl Error for LabelSetError {}

/// An explicit, ordered enumeration of class names.
///
/// The position of a name in the enumeration is its integer label, used for
/// everything downstream: the label array written by the dataset builder, the
/// one-hot targets of the trainer, and the interpretation of predictions. The
/// mapping is fixed at construction time, so build and interpretation can
/// never disagree as long as they share the same `LabelSet`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde_crate::Serialize, serde_crate::Deserialize))]
#[cfg_attr(feature = "serde", serde(crate = "serde_crate"))]
pub struct LabelSet {
    names: Vec<String>,
}

impl LabelSet {
    /// Creates a label set from an ordered list of names.
    ///
    /// # Errors
    ///
    /// Returns `LabelSetError::Empty` for an empty list,
    /// `LabelSetError::DuplicateName` if a name repeats, and
    /// `LabelSetError::TooManyNames` for more than 256 names.
    pub fn new<I, S>(names: I) -> Result<Self, LabelSetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(LabelSetError::Empty);
        }
        if names.len() > 256 {
            return Err(LabelSetError::TooManyNames(names.len()));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(LabelSetError::DuplicateName(name.clone()));
            }
        }
        Ok(LabelSet { names })
    }

    /// The four-step severity enumeration used by the deformity dataset.
    pub fn severity() -> Self {
        LabelSet {
            names: vec![
                "None".to_string(),
                "Low".to_string(),
                "Medium".to_string(),
                "High".to_string(),
            ],
        }
    }

    /// Number of classes in the enumeration.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Looks up the integer label for a name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Looks up the name for an integer label.
    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// The names in enumeration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Errors that can occur when creating validated label types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LabelError {
    /// The input text was empty or contained only whitespace
    #[error("Label cannot be empty")]
    Empty,

    /// The input contained characters outside `[A-Za-z0-9]`
    #[error("Label '{0}' must contain only ASCII letters and digits")]
    InvalidCharacters(String),
}

/// A BIDS entity label.
///
/// BIDS labels (the `01` in `sub-01`, the `rest` in `task-rest`) are restricted to ASCII
/// letters and digits. Separators such as `_` and `-` are structural in BIDS filenames, so a
/// label that contains them cannot be round-tripped through a filename.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(String);

impl Label {
    /// Creates a new `Label` from the given input.
    ///
    /// # Arguments
    ///
    /// * `input` - Any type that can be converted to a string reference
    ///
    /// # Returns
    ///
    /// Returns `Ok(Label)` if the trimmed input is non-empty and alphanumeric,
    /// `Err(LabelError::Empty)` if it is empty, or `Err(LabelError::InvalidCharacters)`
    /// otherwise.
    pub fn new(input: impl AsRef<str>) -> Result<Self, LabelError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(LabelError::Empty);
        }
        if !Self::is_valid(trimmed) {
            return Err(LabelError::InvalidCharacters(trimmed.to_owned()));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns true if `input` is a valid label without allocating.
    pub fn is_valid(input: &str) -> bool {
        !input.is_empty() && input.bytes().all(|b| b.is_ascii_alphanumeric())
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Label {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Label {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Label::new(s)
    }
}

impl serde::Serialize for Label {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Label {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Label::new(&s).map_err(serde::de::Error::custom)
    }
}

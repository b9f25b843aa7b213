use std::fmt;

#[derive(Debug)]
pub enum ShowCardError {
    StyleNotFound(String),
    InvalidDimensions(String),
    EncodeFailure(String),
    Font(String),
    Io(std::io::Error),
}

impl fmt::Display for ShowCardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShowCardError::StyleNotFound(id) => write!(f, "style not found: {}", id),
            ShowCardError::InvalidDimensions(message) => {
                write!(f, "invalid dimensions: {}", message)
            }
            ShowCardError::EncodeFailure(message) => write!(f, "encode failure: {}", message),
            ShowCardError::Font(message) => write!(f, "font error: {}", message),
            ShowCardError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for ShowCardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShowCardError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ShowCardError {
    fn from(value: std::io::Error) -> Self {
        ShowCardError::Io(value)
    }
}

use std::fmt;

/// Failure to turn an XML document into a typed request, or a typed
/// response into an XML document.
#[derive(Debug)]
pub enum CodecError {
    Xml(quick_xml::Error),
    Attr(quick_xml::events::attributes::AttrError),
    Utf8(std::str::Utf8Error),
    MissingChild(&'static str),
    UnexpectedElement(String),
    BadEnumValue(String),
    BadDate(String),
    Eof,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xml(e) => write!(f, "xml error: {}", e),
            Self::Attr(e) => write!(f, "xml attribute error: {}", e),
            Self::Utf8(e) => write!(f, "invalid utf8: {}", e),
            Self::MissingChild(name) => write!(f, "missing required child element: {}", name),
            Self::UnexpectedElement(name) => write!(f, "unexpected element: {}", name),
            Self::BadEnumValue(v) => write!(f, "value does not match any known variant: {}", v),
            Self::BadDate(v) => write!(f, "could not parse date/time: {}", v),
            Self::Eof => write!(f, "unexpected end of document"),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<quick_xml::Error> for CodecError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e)
    }
}

impl From<quick_xml::events::attributes::AttrError> for CodecError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::Attr(e)
    }
}

impl From<std::str::Utf8Error> for CodecError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::Utf8(e)
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

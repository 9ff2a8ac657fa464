use quick_xml::events::attributes::AttrError;

/// Any error raised while decoding a calendar-query body.
///
/// From the protocol layer's point of view every variant is a 400 Bad
/// Request: the filter is structurally broken and the request cannot be
/// partially applied.
#[derive(Debug)]
pub enum ParsingError {
    Recoverable,
    MissingAttribute,
    WrongToken,
    Invalid(&'static str),
    Utf8Error(std::str::Utf8Error),
    QuickXml(quick_xml::Error),
    Chrono(chrono::format::ParseError),
    Eof,
}
impl std::fmt::Display for ParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recoverable => write!(f, "Recoverable"),
            Self::MissingAttribute => write!(f, "Missing attribute"),
            Self::WrongToken => write!(f, "Wrong token"),
            Self::Invalid(msg) => write!(f, "{}", msg),
            Self::Utf8Error(_) => write!(f, "Utf8 Error"),
            Self::QuickXml(_) => write!(f, "Quick XML error"),
            Self::Chrono(_) => write!(f, "Date-time parsing error"),
            Self::Eof => write!(f, "Found EOF while expecting data"),
        }
    }
}
impl std::error::Error for ParsingError {}
impl From<AttrError> for ParsingError {
    fn from(value: AttrError) -> Self {
        Self::QuickXml(value.into())
    }
}
impl From<quick_xml::Error> for ParsingError {
    fn from(value: quick_xml::Error) -> Self {
        Self::QuickXml(value)
    }
}
impl From<std::str::Utf8Error> for ParsingError {
    fn from(value: std::str::Utf8Error) -> Self {
        Self::Utf8Error(value)
    }
}
impl From<chrono::format::ParseError> for ParsingError {
    fn from(value: chrono::format::ParseError) -> Self {
        Self::Chrono(value)
    }
}

use chrono::{DateTime, Utc};

pub const UTC_DATETIME_FMT: &str = "%Y%m%dT%H%M%SZ";
pub const FLOATING_DATETIME_FMT: &str = "%Y%m%dT%H%M%S";
pub const DATE_FMT: &str = "%Y%m%d";

/// iCalendar component registry (RFC 5545 §3.6)
///
/// Only names that appear in comp-filter elements are given variants;
/// everything else round-trips through `Unknown`.
#[derive(Debug, PartialEq, Clone)]
pub enum Component {
    VCalendar,
    VEvent,
    VTodo,
    VJournal,
    VFreeBusy,
    VTimeZone,
    VAlarm,
    Unknown(String),
}
impl Component {
    pub fn new(name: String) -> Self {
        match name.as_str() {
            "VCALENDAR" => Self::VCalendar,
            "VEVENT" => Self::VEvent,
            "VTODO" => Self::VTodo,
            "VJOURNAL" => Self::VJournal,
            "VFREEBUSY" => Self::VFreeBusy,
            "VTIMEZONE" => Self::VTimeZone,
            "VALARM" => Self::VAlarm,
            _ => Self::Unknown(name),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::VCalendar => "VCALENDAR",
            Self::VEvent => "VEVENT",
            Self::VTodo => "VTODO",
            Self::VJournal => "VJOURNAL",
            Self::VFreeBusy => "VFREEBUSY",
            Self::VTimeZone => "VTIMEZONE",
            Self::VAlarm => "VALARM",
            Self::Unknown(raw) => raw.as_str(),
        }
    }

    /// RFC 4791 §9.9: the time-range element is only defined on these
    /// component types.
    pub fn time_range_allowed(&self) -> bool {
        matches!(
            self,
            Self::VEvent | Self::VTodo | Self::VJournal | Self::VFreeBusy | Self::VAlarm
        )
    }
}

/// Known collations from the supported-collation-set (RFC 4791 §7.5.1)
#[derive(Debug, PartialEq, Clone)]
pub enum Collation {
    AsciiCaseMap,
    Octet,
    Unknown(String),
}
impl Collation {
    /// The literal `default` is an alias for the server default
    /// collation, i;ascii-casemap.
    pub fn new(raw: String) -> Self {
        match raw.as_str() {
            "i;ascii-casemap" | "default" => Self::AsciiCaseMap,
            "i;octet" => Self::Octet,
            _ => Self::Unknown(raw),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::AsciiCaseMap => "i;ascii-casemap",
            Self::Octet => "i;octet",
            Self::Unknown(c) => c.as_str(),
        }
    }
}
impl Default for Collation {
    fn default() -> Self {
        Self::AsciiCaseMap
    }
}

/// 9.9.  CALDAV:time-range XML Element
///
/// Name:  time-range
///
/// Definition:
///
/// <!ELEMENT time-range EMPTY>
/// <!ATTLIST time-range start CDATA #IMPLIED
///                      end   CDATA #IMPLIED>
/// start value: an iCalendar "date with UTC time"
/// end value: an iCalendar "date with UTC time"
///
/// At least one bound must be present, and when both are, end must be
/// strictly after start (enforced by the decoder).
#[derive(Debug, PartialEq, Clone)]
pub enum TimeRange {
    OnlyStart(DateTime<Utc>),
    OnlyEnd(DateTime<Utc>),
    FullRange(DateTime<Utc>, DateTime<Utc>),
}
impl TimeRange {
    pub fn start(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::OnlyStart(start) | Self::FullRange(start, _) => Some(start),
            Self::OnlyEnd(_) => None,
        }
    }

    pub fn end(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::OnlyEnd(end) | Self::FullRange(_, end) => Some(end),
            Self::OnlyStart(_) => None,
        }
    }
}

/// 9.7.5.  CALDAV:text-match XML Element
///
/// Name:  text-match
///
/// Purpose:  Specifies a substring match on a property or parameter
/// value.
///
/// <!ELEMENT text-match (#PCDATA)>
/// PCDATA value: string
/// <!ATTLIST text-match collation        CDATA "i;ascii-casemap"
///                      negate-condition (yes | no) "no">
#[derive(Debug, PartialEq, Clone)]
pub struct TextMatch {
    pub collation: Collation,
    pub negate_condition: bool,
    pub text: String,
}

/// 9.7.3.  CALDAV:param-filter XML Element
///
/// Name:  param-filter
///
/// Purpose:  Limits the search to specific parameter values.
///
/// <!ELEMENT param-filter (is-not-defined | text-match?)>
/// <!ATTLIST param-filter name CDATA #REQUIRED>
#[derive(Debug, PartialEq, Clone)]
pub struct ParamFilter {
    pub name: String,
    pub additional_rules: Option<ParamFilterRules>,
}
#[derive(Debug, PartialEq, Clone)]
pub enum ParamFilterRules {
    IsNotDefined,
    Match(TextMatch),
}

/// 9.7.2.  CALDAV:prop-filter XML Element
///
/// Name:  prop-filter
///
/// Purpose:  Specifies search criteria on calendar properties.
///
/// <!ELEMENT prop-filter (is-not-defined |
///                        ((time-range | text-match)?,
///                         param-filter*))>
/// <!ATTLIST prop-filter name CDATA #REQUIRED>
#[derive(Debug, PartialEq, Clone)]
pub struct PropFilter {
    pub name: String,
    pub additional_rules: Option<PropFilterRules>,
}
#[derive(Debug, PartialEq, Clone)]
pub enum PropFilterRules {
    IsNotDefined,
    Match(PropFilterMatch),
}

/// Time-range and text-match are kept as two independent options: the
/// grammar makes them alternatives, but a hand-crafted request carrying
/// both is accepted; the evaluator then lets the time-range decide, as
/// the original engine does.
#[derive(Debug, PartialEq, Clone)]
pub struct PropFilterMatch {
    pub time_range: Option<TimeRange>,
    pub text_match: Option<TextMatch>,
    pub param_filter: Vec<ParamFilter>,
}

/// 9.7.1.  CALDAV:comp-filter XML Element
///
/// Name:  comp-filter
///
/// Purpose:  Specifies search criteria on calendar components.
///
/// <!ELEMENT comp-filter (is-not-defined | (time-range?,
///                        prop-filter*, comp-filter*))>
/// <!ATTLIST comp-filter name CDATA #REQUIRED>
#[derive(Debug, PartialEq, Clone)]
pub struct CompFilter {
    pub name: Component,
    pub additional_rules: Option<CompFilterRules>,
}
#[derive(Debug, PartialEq, Clone)]
pub enum CompFilterRules {
    IsNotDefined,
    Matches(CompFilterMatch),
}
#[derive(Debug, PartialEq, Clone)]
pub struct CompFilterMatch {
    pub time_range: Option<TimeRange>,
    pub prop_filter: Vec<PropFilter>,
    pub comp_filter: Vec<CompFilter>,
}

/// 9.7.  CALDAV:filter XML Element
///
/// Name:  filter
///
/// Purpose:  Specifies a filter to limit the set of calendar components
/// returned by the server.
///
/// <!ELEMENT filter (comp-filter)>
#[derive(Debug, PartialEq, Clone)]
pub struct Filter(pub CompFilter);

/// 9.6.5.  CALDAV:expand XML Element
///
/// Name:  expand
///
/// Purpose:  Forces the server to expand recurring components into
/// individual calendar component instances.
///
/// <!ELEMENT expand EMPTY>
/// <!ATTLIST expand start CDATA #REQUIRED
///                  end   CDATA #REQUIRED>
///
/// The expansion itself is the caller's job; the decoder only validates
/// and passes the window through.
#[derive(Debug, PartialEq, Clone)]
pub struct Expand {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// 9.5.  CALDAV:calendar-query Report
///
/// The decoded REPORT body: the list of requested property names (Clark
/// notation), the optional expand window found under calendar-data, and
/// the one and only filter.
#[derive(Debug, PartialEq, Clone)]
pub struct CalendarQuery {
    pub requested: Vec<String>,
    pub expand: Option<Expand>,
    pub filter: Filter,
}

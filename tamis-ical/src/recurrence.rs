use chrono::{DateTime, TimeDelta, Utc};

use crate::object::{parameter_value, Node};
use crate::parser;

/// How a VALARM trigger is anchored (RFC 5545 §3.8.6.3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    /// VALUE=DATE-TIME: fires at the same absolute instant on every
    /// occurrence of the enclosing event.
    Absolute(DateTime<Utc>),
    /// A duration relative to each occurrence.
    Relative(TimeDelta, Related),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Related {
    Start,
    End,
}

/// Parse the TRIGGER property of an alarm component.
pub fn trigger(alarm: &Node) -> Option<Trigger> {
    let prop = alarm.property("TRIGGER")?;

    if parameter_value(prop, "VALUE") == Some("DATE-TIME") {
        let at = parser::date_time(prop.val.as_str())?;
        tracing::trace!(trigger=?at, "resolved absolute trigger");
        return Some(Trigger::Absolute(at));
    }

    let (_, delta) = parser::dur_value(prop.val.as_str()).ok()?;
    let related = match parameter_value(prop, "RELATED") {
        Some("END") => Related::End,
        // RFC 5545: the default is relative to the start
        _ => Related::Start,
    };
    Some(Trigger::Relative(delta, related))
}

/// Absolute moment the alarm fires for the master instance of `parent`.
///
/// A trigger relative to END resolves against DTEND, falling back to
/// DUE for to-dos.
pub fn effective_trigger_time(alarm: &Node, parent: &Node) -> Option<DateTime<Utc>> {
    match trigger(alarm)? {
        Trigger::Absolute(at) => Some(at),
        Trigger::Relative(delta, related) => {
            let anchor = match related {
                Related::Start => parent.property_date("DTSTART"),
                Related::End => parent
                    .property_date("DTEND")
                    .or_else(|| parent.property_date("DUE")),
            }?;
            let at = anchor + delta;
            tracing::trace!(trigger=?at, "resolved relative trigger");
            Some(at)
        }
    }
}

/// One alarm of an expanded occurrence, with its trigger resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmInstance {
    pub trigger: DateTime<Utc>,
    /// False for VALUE=DATE-TIME triggers, which do not move between
    /// occurrences.
    pub relative: bool,
}

/// One expanded instance of a recurring event, occupying [start, end).
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub alarms: Vec<AlarmInstance>,
}

impl Occurrence {
    /// Build the instance of `event` occupying [start, end), resolving
    /// each nested alarm's trigger against this instance. Alarms whose
    /// TRIGGER does not parse are dropped.
    pub fn of_event(event: &Node, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let alarms = event
            .children("VALARM")
            .filter_map(|alarm| match trigger(&alarm) {
                Some(Trigger::Absolute(at)) => Some(AlarmInstance {
                    trigger: at,
                    relative: false,
                }),
                Some(Trigger::Relative(delta, Related::Start)) => Some(AlarmInstance {
                    trigger: start + delta,
                    relative: true,
                }),
                Some(Trigger::Relative(delta, Related::End)) => Some(AlarmInstance {
                    trigger: end + delta,
                    relative: true,
                }),
                None => None,
            })
            .collect();

        Occurrence { start, end, alarms }
    }
}

/// Occurrence iteration for recurring events.
///
/// The engine does not ship an RRULE interpreter; the surrounding
/// system provides one through this trait. Implementations must yield
/// occurrences in ascending start order and must bound the iteration
/// (occurrence count or horizon cap): the evaluator's early exits are
/// the usual stop condition, but an effectively infinite rule combined
/// with an open-ended query window would otherwise never terminate.
pub trait RecurrenceExpander {
    /// Iterate the occurrences of the event identified by `uid` inside
    /// `calendar`. The iterator is local to one evaluation and is never
    /// reused after exhaustion.
    fn expand<'a>(
        &'a self,
        calendar: Node<'a>,
        uid: &str,
    ) -> Box<dyn Iterator<Item = Occurrence> + 'a>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{vcalendar_root, Tree};
    use chrono::{TimeZone, Utc};

    const ICS: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:recur-1\r\nDTSTART:20240115T100000Z\r\nDTEND:20240115T110000Z\r\nRRULE:FREQ=DAILY\r\nBEGIN:VALARM\r\nTRIGGER:-PT15M\r\nACTION:DISPLAY\r\nEND:VALARM\r\nBEGIN:VALARM\r\nTRIGGER;VALUE=DATE-TIME:20240120T090000Z\r\nACTION:DISPLAY\r\nEND:VALARM\r\nBEGIN:VALARM\r\nTRIGGER;RELATED=END:PT5M\r\nACTION:DISPLAY\r\nEND:VALARM\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    #[test]
    fn trigger_kinds() {
        let ics = icalendar::parser::read_calendar(ICS).unwrap();
        let root = vcalendar_root(ics);
        let tree = Tree::new(&root);
        let event = tree.root().children("VEVENT").next().unwrap();
        let alarms: Vec<_> = event.children("VALARM").collect();

        assert_eq!(
            trigger(&alarms[0]),
            Some(Trigger::Relative(
                TimeDelta::try_minutes(-15).unwrap(),
                Related::Start
            )),
        );
        assert_eq!(
            trigger(&alarms[1]),
            Some(Trigger::Absolute(
                Utc.with_ymd_and_hms(2024, 1, 20, 9, 0, 0).unwrap()
            )),
        );
        assert_eq!(
            trigger(&alarms[2]),
            Some(Trigger::Relative(
                TimeDelta::try_minutes(5).unwrap(),
                Related::End
            )),
        );
    }

    #[test]
    fn effective_trigger_on_master_instance() {
        let ics = icalendar::parser::read_calendar(ICS).unwrap();
        let root = vcalendar_root(ics);
        let tree = Tree::new(&root);
        let event = tree.root().children("VEVENT").next().unwrap();
        let alarms: Vec<_> = event.children("VALARM").collect();

        assert_eq!(
            effective_trigger_time(&alarms[0], &event),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 9, 45, 0).unwrap()),
        );
        assert_eq!(
            effective_trigger_time(&alarms[2], &event),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 11, 5, 0).unwrap()),
        );
    }

    #[test]
    fn occurrence_resolves_alarms() {
        let ics = icalendar::parser::read_calendar(ICS).unwrap();
        let root = vcalendar_root(ics);
        let tree = Tree::new(&root);
        let event = tree.root().children("VEVENT").next().unwrap();

        let start = Utc.with_ymd_and_hms(2024, 1, 17, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 17, 11, 0, 0).unwrap();
        let occurrence = Occurrence::of_event(&event, start, end);

        assert_eq!(occurrence.alarms.len(), 3);
        // relative to start, shifted with the occurrence
        assert_eq!(
            occurrence.alarms[0].trigger,
            Utc.with_ymd_and_hms(2024, 1, 17, 9, 45, 0).unwrap()
        );
        assert!(occurrence.alarms[0].relative);
        // absolute, pinned
        assert_eq!(
            occurrence.alarms[1].trigger,
            Utc.with_ymd_and_hms(2024, 1, 20, 9, 0, 0).unwrap()
        );
        assert!(!occurrence.alarms[1].relative);
        // relative to end
        assert_eq!(
            occurrence.alarms[2].trigger,
            Utc.with_ymd_and_hms(2024, 1, 17, 11, 5, 0).unwrap()
        );
        assert!(occurrence.alarms[2].relative);
    }
}

use tamis_dav::decoder::parse_calendar_query;
use tamis_ical::object::{vcalendar_root, Node, Tree};
use tamis_ical::query::Validator;
use tamis_ical::recurrence::{Occurrence, RecurrenceExpander};

struct NoRecurrence;
impl RecurrenceExpander for NoRecurrence {
    fn expand<'a>(
        &'a self,
        _calendar: Node<'a>,
        _uid: &str,
    ) -> Box<dyn Iterator<Item = Occurrence> + 'a> {
        Box::new(std::iter::empty())
    }
}

async fn matches(report: &str, ics: &str) -> bool {
    let query = parse_calendar_query(report.as_bytes()).await.unwrap();
    let parsed = icalendar::parser::read_calendar(ics).unwrap();
    let root = vcalendar_root(parsed);
    let tree = Tree::new(&root);
    Validator::new(&NoRecurrence)
        .validate(&tree.root(), &query.filter)
        .unwrap()
}

fn event(fields: &str) -> String {
    format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//tests//EN\r\nBEGIN:VEVENT\r\nUID:it-1\r\n{}END:VEVENT\r\nEND:VCALENDAR\r\n",
        fields
    )
}

fn summary_report(negate: bool) -> String {
    format!(
        r#"
<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:prop><D:getetag/><C:calendar-data/></D:prop>
  <C:filter>
    <C:comp-filter name="VCALENDAR">
      <C:comp-filter name="VEVENT">
        <C:prop-filter name="SUMMARY">
          <C:text-match collation="i;ascii-casemap"{}>Meeting</C:text-match>
        </C:prop-filter>
      </C:comp-filter>
    </C:comp-filter>
  </C:filter>
</C:calendar-query>
"#,
        if negate { r#" negate-condition="yes""# } else { "" }
    )
}

#[tokio::test]
async fn summary_text_match_end_to_end() {
    let meeting = event("DTSTART:20240115T100000Z\r\nSUMMARY:Team Meeting\r\n");
    let lunch = event("DTSTART:20240115T100000Z\r\nSUMMARY:Lunch\r\n");

    assert!(matches(&summary_report(false), &meeting).await);
    assert!(!matches(&summary_report(false), &lunch).await);

    // negate-condition inverts both outcomes
    assert!(!matches(&summary_report(true), &meeting).await);
    assert!(matches(&summary_report(true), &lunch).await);
}

#[tokio::test]
async fn event_time_range_end_to_end() {
    let report = r#"
<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:prop><D:getetag/></D:prop>
  <C:filter>
    <C:comp-filter name="VCALENDAR">
      <C:comp-filter name="VEVENT">
        <C:time-range start="20240101T000000Z" end="20240201T000000Z"/>
      </C:comp-filter>
    </C:comp-filter>
  </C:filter>
</C:calendar-query>
"#;

    let january = event("DTSTART:20240115T100000Z\r\nDTEND:20240115T110000Z\r\n");
    let march = event("DTSTART:20240301T100000Z\r\n");

    assert!(matches(report, &january).await);
    assert!(!matches(report, &march).await);
}

#[tokio::test]
async fn partstat_param_filter_end_to_end() {
    let report = r#"
<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:prop><D:getetag/></D:prop>
  <C:filter>
    <C:comp-filter name="VCALENDAR">
      <C:comp-filter name="VEVENT">
        <C:prop-filter name="ATTENDEE">
          <C:param-filter name="PARTSTAT">
            <C:text-match collation="i;ascii-casemap">ACCEPTED</C:text-match>
          </C:param-filter>
        </C:prop-filter>
      </C:comp-filter>
    </C:comp-filter>
  </C:filter>
</C:calendar-query>
"#;

    let accepted = event(
        "DTSTART:20240115T100000Z\r\nATTENDEE;PARTSTAT=ACCEPTED:mailto:lisa@example.com\r\n",
    );
    let declined = event(
        "DTSTART:20240115T100000Z\r\nATTENDEE;PARTSTAT=DECLINED:mailto:marc@example.com\r\n",
    );

    assert!(matches(report, &accepted).await);
    assert!(!matches(report, &declined).await);
}

#[tokio::test]
async fn is_not_defined_end_to_end() {
    let report = r#"
<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:prop><D:getetag/></D:prop>
  <C:filter>
    <C:comp-filter name="VCALENDAR">
      <C:comp-filter name="VTODO">
        <C:is-not-defined/>
      </C:comp-filter>
    </C:comp-filter>
  </C:filter>
</C:calendar-query>
"#;

    let only_event = event("DTSTART:20240115T100000Z\r\nSUMMARY:Team Meeting\r\n");
    let with_todo = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VTODO\r\nUID:todo-1\r\nDUE:20240120T120000Z\r\nEND:VTODO\r\nEND:VCALENDAR\r\n";

    assert!(matches(report, &only_event).await);
    assert!(!matches(report, with_todo).await);
}

use chrono::{DateTime, NaiveDateTime, Utc};
use futures::future::LocalBoxFuture;
use quick_xml::events::Event;

use super::error::ParsingError;
use super::types::*;
use super::xml::{IRead, QRead, Reader, CAL_URN, DAV_URN};

/// Decode a raw calendar-query REPORT body.
///
/// Convenience wrapper for callers that hold the whole body in memory;
/// streaming callers build their own `Reader`.
pub async fn parse_calendar_query(src: &[u8]) -> Result<CalendarQuery, ParsingError> {
    let mut rdr = Reader::new(quick_xml::NsReader::from_reader(src)).await?;
    let query: CalendarQuery = rdr.find().await?;
    tracing::debug!(filter=?query.filter, "decoded calendar-query");
    Ok(query)
}

/// Time-range and expand attributes are "dates with UTC time"
/// (YYYYMMDDTHHMMSSZ); a missing Z is tolerated and read as UTC.
fn datetime_attr(raw: &str) -> Result<DateTime<Utc>, ParsingError> {
    let fmt = match raw.chars().last() {
        Some('Z') => UTC_DATETIME_FMT,
        Some(_) => FLOATING_DATETIME_FMT,
        None => return Err(ParsingError::Invalid("empty date-time attribute")),
    };
    Ok(NaiveDateTime::parse_from_str(raw, fmt)?.and_utc())
}

impl QRead<CalendarQuery> for CalendarQuery {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(CAL_URN, "calendar-query").await?;

        let mut requested = Vec::new();
        let mut expand = None;
        let mut filter: Option<Filter> = None;

        while xml.parent_has_child() {
            let mut dirty = false;

            if xml.maybe_open(DAV_URN, "prop").await?.is_some() {
                read_prop_list(xml, &mut requested, &mut expand).await?;
                xml.close().await?;
                continue;
            }

            let mut found = None;
            xml.maybe_read::<Filter>(&mut found, &mut dirty).await?;
            if let Some(f) = found {
                if filter.is_some() {
                    return Err(ParsingError::Invalid(
                        "calendar-query must contain exactly one filter element",
                    ));
                }
                filter = Some(f);
            }

            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => {
                        xml.skip().await?;
                    }
                };
            }
        }
        xml.close().await?;

        match filter {
            Some(filter) => Ok(CalendarQuery {
                requested,
                expand,
                filter,
            }),
            None => Err(ParsingError::Invalid(
                "calendar-query must contain exactly one filter element",
            )),
        }
    }
}

/// Children of the DAV:prop element: every requested property name is
/// recorded in Clark notation; calendar-data additionally carries the
/// optional expand directive.
async fn read_prop_list(
    xml: &mut Reader<impl IRead>,
    requested: &mut Vec<String>,
    expand: &mut Option<Expand>,
) -> Result<(), ParsingError> {
    while xml.parent_has_child() {
        if xml.maybe_open(CAL_URN, "calendar-data").await?.is_some() {
            requested.push(format!(
                "{{{}}}calendar-data",
                std::str::from_utf8(CAL_URN)?
            ));
            while xml.parent_has_child() {
                let mut dirty = false;
                xml.maybe_read(expand, &mut dirty).await?;
                if !dirty {
                    match xml.peek() {
                        Event::End(_) => break,
                        _ => {
                            xml.skip().await?;
                        }
                    };
                }
            }
            xml.close().await?;
            continue;
        }

        match xml.peek() {
            Event::Start(_) | Event::Empty(_) => {
                requested.push(xml.qualified_name()?);
                xml.skip().await?;
            }
            Event::End(_) => break,
            _ => {
                xml.skip().await?;
            }
        }
    }
    Ok(())
}

impl QRead<Expand> for Expand {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(CAL_URN, "expand").await?;
        let (start, end) = match (xml.prev_attr("start"), xml.prev_attr("end")) {
            (Some(start), Some(end)) => (datetime_attr(&start)?, datetime_attr(&end)?),
            _ => {
                return Err(ParsingError::Invalid(
                    "expand requires both start and end attributes",
                ))
            }
        };
        xml.close().await?;

        if end <= start {
            return Err(ParsingError::Invalid("expand end must be after start"));
        }
        Ok(Expand { start, end })
    }
}

impl QRead<Filter> for Filter {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(CAL_URN, "filter").await?;
        let mut roots: Vec<CompFilter> = xml.collect().await?;
        xml.close().await?;

        match (roots.pop(), roots.is_empty()) {
            (Some(root), true) => Ok(Filter(root)),
            _ => Err(ParsingError::Invalid(
                "filter must contain exactly one comp-filter",
            )),
        }
    }
}

impl QRead<CompFilter> for CompFilter {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(CAL_URN, "comp-filter").await?;
        let name = Component::new(
            xml.prev_attr("name")
                .ok_or(ParsingError::MissingAttribute)?,
        );

        // Recursion in an async fn requires boxing
        // rustc --explain E0733
        fn recurse<'a>(
            xml: &'a mut Reader<impl IRead>,
        ) -> LocalBoxFuture<'a, Result<CompFilter, ParsingError>> {
            Box::pin(CompFilter::qread(xml))
        }

        let mut is_not_defined = false;
        let mut time_range = None;
        let mut prop_filter = Vec::new();
        let mut comp_filter = Vec::new();

        while xml.parent_has_child() {
            let mut dirty = false;

            if xml.maybe_open(CAL_URN, "is-not-defined").await?.is_some() {
                xml.close().await?;
                is_not_defined = true;
                continue;
            }

            xml.maybe_read(&mut time_range, &mut dirty).await?;
            xml.maybe_push(&mut prop_filter, &mut dirty).await?;

            if xml.parent_has_child() && !dirty {
                match recurse(xml).await {
                    Ok(inner) => {
                        comp_filter.push(inner);
                        dirty = true;
                    }
                    Err(ParsingError::Recoverable) => (),
                    Err(e) => return Err(e),
                }
            }

            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => {
                        xml.skip().await?;
                    }
                };
            }
        }
        xml.close().await?;

        let additional_rules = if is_not_defined {
            Some(CompFilterRules::IsNotDefined)
        } else if time_range.is_none() && prop_filter.is_empty() && comp_filter.is_empty() {
            None
        } else {
            Some(CompFilterRules::Matches(CompFilterMatch {
                time_range,
                prop_filter,
                comp_filter,
            }))
        };

        if let Some(CompFilterRules::Matches(matcher)) = &additional_rules {
            if matcher.time_range.is_some() && !name.time_range_allowed() {
                return Err(ParsingError::Invalid(
                    "time-range is not allowed on this component type",
                ));
            }
        }

        Ok(CompFilter {
            name,
            additional_rules,
        })
    }
}

impl QRead<PropFilter> for PropFilter {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(CAL_URN, "prop-filter").await?;
        let name = xml
            .prev_attr("name")
            .ok_or(ParsingError::MissingAttribute)?;

        let mut is_not_defined = false;
        let (mut time_range, mut text_match) = (None, None);
        let mut param_filter = Vec::new();

        while xml.parent_has_child() {
            let mut dirty = false;

            if xml.maybe_open(CAL_URN, "is-not-defined").await?.is_some() {
                xml.close().await?;
                is_not_defined = true;
                continue;
            }

            xml.maybe_read(&mut time_range, &mut dirty).await?;
            xml.maybe_read(&mut text_match, &mut dirty).await?;
            xml.maybe_push(&mut param_filter, &mut dirty).await?;

            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => {
                        xml.skip().await?;
                    }
                };
            }
        }
        xml.close().await?;

        let additional_rules = if is_not_defined {
            Some(PropFilterRules::IsNotDefined)
        } else if time_range.is_none() && text_match.is_none() && param_filter.is_empty() {
            None
        } else {
            Some(PropFilterRules::Match(PropFilterMatch {
                time_range,
                text_match,
                param_filter,
            }))
        };

        Ok(PropFilter {
            name,
            additional_rules,
        })
    }
}

impl QRead<ParamFilter> for ParamFilter {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(CAL_URN, "param-filter").await?;
        let name = xml
            .prev_attr("name")
            .ok_or(ParsingError::MissingAttribute)?;

        let mut is_not_defined = false;
        let mut text_match = None;

        while xml.parent_has_child() {
            let mut dirty = false;

            if xml.maybe_open(CAL_URN, "is-not-defined").await?.is_some() {
                xml.close().await?;
                is_not_defined = true;
                continue;
            }

            xml.maybe_read(&mut text_match, &mut dirty).await?;

            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => {
                        xml.skip().await?;
                    }
                };
            }
        }
        xml.close().await?;

        let additional_rules = if is_not_defined {
            Some(ParamFilterRules::IsNotDefined)
        } else {
            text_match.map(ParamFilterRules::Match)
        };

        Ok(ParamFilter {
            name,
            additional_rules,
        })
    }
}

impl QRead<TextMatch> for TextMatch {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(CAL_URN, "text-match").await?;
        let collation = xml
            .prev_attr("collation")
            .map(Collation::new)
            .unwrap_or_default();
        let negate_condition = matches!(xml.prev_attr("negate-condition").as_deref(), Some("yes"));
        let text = xml.tag_string().await?;
        xml.close().await?;

        Ok(TextMatch {
            collation,
            negate_condition,
            text,
        })
    }
}

impl QRead<TimeRange> for TimeRange {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(CAL_URN, "time-range").await?;
        let (start, end) = (xml.prev_attr("start"), xml.prev_attr("end"));
        xml.close().await?;

        match (start, end) {
            (Some(start), Some(end)) => {
                let (start, end) = (datetime_attr(&start)?, datetime_attr(&end)?);
                if end <= start {
                    return Err(ParsingError::Invalid("time-range end must be after start"));
                }
                Ok(TimeRange::FullRange(start, end))
            }
            (Some(start), None) => Ok(TimeRange::OnlyStart(datetime_attr(&start)?)),
            (None, Some(end)) => Ok(TimeRange::OnlyEnd(datetime_attr(&end)?)),
            (None, None) => Err(ParsingError::Invalid(
                "time-range requires a start or end attribute",
            )),
        }
    }
}

use icalendar::parser::{Parameter, Property};

use tamis_dav::types as cal;

use crate::error::QueryError;
use crate::object::{parameters, Node};
use crate::recurrence::RecurrenceExpander;
use crate::timerange::{property_in_time_range, TimeRangeEvaluator};

/// Walks a decoded filter tree against one calendar object.
///
/// The three filter levels (component, property, parameter) share the
/// same shape: collect the same-named candidates, dispatch on
/// is-not-defined/presence, then search for one candidate satisfying
/// the nested constraints.
pub struct Validator<'e> {
    timerange: TimeRangeEvaluator<'e>,
}

impl<'e> Validator<'e> {
    pub fn new(expander: &'e dyn RecurrenceExpander) -> Self {
        Self {
            timerange: TimeRangeEvaluator::new(expander),
        }
    }

    /// Does this calendar object satisfy the filter?
    pub fn validate(&self, root: &Node, filter: &cal::Filter) -> Result<bool, QueryError> {
        let top = &filter.0;
        if root.name() != top.name.as_str() {
            return Ok(false);
        }
        match &top.additional_rules {
            None => Ok(true),
            Some(cal::CompFilterRules::IsNotDefined) => Ok(false),
            Some(cal::CompFilterRules::Matches(matcher)) => {
                Ok(self.comp_filters_match(root, &matcher.comp_filter)?
                    && self.prop_filters_match(root, &matcher.prop_filter)?)
            }
        }
    }

    fn comp_filters_match(
        &self,
        parent: &Node,
        filters: &[cal::CompFilter],
    ) -> Result<bool, QueryError> {
        for filter in filters {
            let candidates: Vec<Node> = parent.children(filter.name.as_str()).collect();
            let matched = match (&filter.additional_rules, candidates.is_empty()) {
                (Some(cal::CompFilterRules::IsNotDefined), absent) => absent,
                (None, absent) => !absent,
                (Some(cal::CompFilterRules::Matches(_)), true) => false,
                (Some(cal::CompFilterRules::Matches(matcher)), false) => match &matcher.time_range {
                    // A time-range decides the filter on its own: one
                    // instance inside the window is enough.
                    Some(range) => any_candidate(&candidates, |comp| {
                        self.timerange.is_in_time_range(comp, range)
                    })?,
                    None if matcher.comp_filter.is_empty() && matcher.prop_filter.is_empty() => {
                        true
                    }
                    // At least one instance must satisfy every nested
                    // filter; an instance failing its prop-filters must
                    // not abort the search, the next sibling is tried.
                    None => any_candidate(&candidates, |comp| {
                        Ok(self.comp_filters_match(comp, &matcher.comp_filter)?
                            && self.prop_filters_match(comp, &matcher.prop_filter)?)
                    })?,
                },
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn prop_filters_match(
        &self,
        parent: &Node,
        filters: &[cal::PropFilter],
    ) -> Result<bool, QueryError> {
        for filter in filters {
            let candidates: Vec<&Property> = parent.properties(&filter.name).collect();
            let matched = match (&filter.additional_rules, candidates.is_empty()) {
                (Some(cal::PropFilterRules::IsNotDefined), absent) => absent,
                (None, absent) => !absent,
                (Some(cal::PropFilterRules::Match(_)), true) => false,
                (Some(cal::PropFilterRules::Match(matcher)), false) => match &matcher.time_range {
                    Some(range) => {
                        any_candidate(&candidates, |prop| property_in_time_range(prop, range))?
                    }
                    None if matcher.text_match.is_none() && matcher.param_filter.is_empty() => true,
                    None => any_candidate(&candidates, |prop| {
                        Ok(param_filters_match(prop, &matcher.param_filter)?
                            && match &matcher.text_match {
                                Some(text_match) => text_matches(prop.val.as_str(), text_match)?,
                                None => true,
                            })
                    })?,
                },
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn param_filters_match(prop: &Property, filters: &[cal::ParamFilter]) -> Result<bool, QueryError> {
    for filter in filters {
        let candidates: Vec<&Parameter> = parameters(prop, &filter.name).collect();
        let matched = match (&filter.additional_rules, candidates.is_empty()) {
            (Some(cal::ParamFilterRules::IsNotDefined), absent) => absent,
            (None, absent) => !absent,
            (Some(cal::ParamFilterRules::Match(_)), true) => false,
            (Some(cal::ParamFilterRules::Match(text_match)), false) => {
                any_candidate(&candidates, |param| match &param.val {
                    Some(value) => text_matches(value.as_str(), text_match),
                    None => Ok(false),
                })?
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// "At least one candidate satisfies": stops at the first success and
/// keeps trying siblings after a failure.
fn any_candidate<C>(
    candidates: &[C],
    mut check: impl FnMut(&C) -> Result<bool, QueryError>,
) -> Result<bool, QueryError> {
    for candidate in candidates {
        if check(candidate)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Collation-aware substring matching (RFC 4790), negated when the
/// filter asks for it.
pub(crate) fn text_matches(haystack: &str, text_match: &cal::TextMatch) -> Result<bool, QueryError> {
    let is_match = match &text_match.collation {
        cal::Collation::AsciiCaseMap => haystack
            .to_ascii_lowercase()
            .contains(&text_match.text.to_ascii_lowercase()),
        cal::Collation::Octet => haystack.contains(text_match.text.as_str()),
        cal::Collation::Unknown(name) => {
            return Err(QueryError::BadRequest(format!(
                "collation {} is not supported",
                name
            )))
        }
    };
    Ok(text_match.negate_condition ^ is_match)
}

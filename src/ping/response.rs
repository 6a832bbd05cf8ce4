use super::checksum::checksum_offset;
use super::protocol::{
    EVENTS_CGI_SEPARATOR, EVENTS_CGI_VARIABLE, RESPONSE_FIELD_SEPARATOR, RLZ_CGI_VARIABLE,
    STATEFUL_EVENTS_CGI_VARIABLE,
};
use crate::error::RlzError;
use crate::model::types::{AccessPoint, EventToken, MAX_RLZ_LENGTH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RlzUpdate {
    pub point: AccessPoint,
    pub value: String,
}

/// Everything a validated response asks for, in line order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponsePlan {
    pub rlz_updates: Vec<RlzUpdate>,
    /// Transient events the server has counted.
    pub cleared_events: Vec<EventToken>,
    /// Events to remember permanently.
    pub stateful_events: Vec<EventToken>,
    /// Lines that looked like a known field but could not be read.
    pub skipped_lines: usize,
}

#[derive(Debug)]
pub enum ResponseDisposition {
    /// Failed the length or checksum gate. Nothing may be applied.
    Rejected(RlzError),
    /// Valid, but there is nothing before the checksum line.
    EmptyAccepted,
    Applied(ResponsePlan),
}

/// One classified response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseLine {
    Rlz(RlzUpdate),
    Events(Vec<EventToken>),
    StatefulEvents(Vec<EventToken>),
    Ignored,
}

/// Non-empty lines of the checksummed region.
pub fn split_lines(region: &str) -> impl Iterator<Item = &str> {
    region.split('\n').filter(|line| !line.is_empty())
}

/// Drops leading whitespace and cuts at the first CR, LF or space.
fn field_value(raw: &str) -> &str {
    let value = raw.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let end = value.find(['\r', '\n', ' ']).unwrap_or(value.len());
    &value[..end]
}

/// Decodes a comma separated token list. Tokens of the wrong length, with
/// unknown codes or decoding to a sentinel are dropped.
pub fn parse_event_tokens(list: &str) -> Vec<EventToken> {
    field_value(list)
        .split(EVENTS_CGI_SEPARATOR)
        .filter_map(|raw| {
            let token = EventToken::decode(raw);
            if token.is_none() && !raw.is_empty() {
                tracing::debug!("Skipping event token '{}'", raw);
            }
            token
        })
        .collect()
}

/// Dispatches one line on its prefix.
pub fn classify_line(line: &str) -> Result<ResponseLine, RlzError> {
    if line.starts_with(RLZ_CGI_VARIABLE) {
        let separator = line
            .find(RESPONSE_FIELD_SEPARATOR)
            .ok_or_else(|| RlzError::MalformedLine(line.to_string()))?;

        let code = line.get(RLZ_CGI_VARIABLE.len()..separator).unwrap_or_default();
        let point = match AccessPoint::from_code(code) {
            Some(point) if point != AccessPoint::NoAccessPoint => point,
            _ => return Err(RlzError::MalformedLine(line.to_string())),
        };

        let value = field_value(&line[separator + RESPONSE_FIELD_SEPARATOR.len()..]);
        if value.len() > MAX_RLZ_LENGTH {
            return Err(RlzError::MalformedLine(line.to_string()));
        }
        return Ok(ResponseLine::Rlz(RlzUpdate {
            point,
            value: value.to_string(),
        }));
    }

    let events_header = format!("{}{}", EVENTS_CGI_VARIABLE, RESPONSE_FIELD_SEPARATOR);
    if let Some(list) = line.strip_prefix(&events_header) {
        return Ok(ResponseLine::Events(parse_event_tokens(list)));
    }

    let stateful_header = format!("{}{}", STATEFUL_EVENTS_CGI_VARIABLE, RESPONSE_FIELD_SEPARATOR);
    if let Some(list) = line.strip_prefix(&stateful_header) {
        return Ok(ResponseLine::StatefulEvents(parse_event_tokens(list)));
    }

    Ok(ResponseLine::Ignored)
}

/// Validates a response and lists the changes it asks for.
///
/// Pure: nothing is read from or written to any store.
pub fn plan_response(response: &str) -> ResponseDisposition {
    let offset = match checksum_offset(response) {
        Ok(offset) => offset,
        Err(err) => return ResponseDisposition::Rejected(err),
    };
    if offset == 0 {
        return ResponseDisposition::EmptyAccepted;
    }

    let mut plan = ResponsePlan::default();
    for line in split_lines(&response[..offset]) {
        match classify_line(line) {
            Ok(ResponseLine::Rlz(update)) => plan.rlz_updates.push(update),
            Ok(ResponseLine::Events(tokens)) => plan.cleared_events.extend(tokens),
            Ok(ResponseLine::StatefulEvents(tokens)) => plan.stateful_events.extend(tokens),
            Ok(ResponseLine::Ignored) => {}
            Err(err) => {
                tracing::debug!("{}", err);
                plan.skipped_lines += 1;
            }
        }
    }
    ResponseDisposition::Applied(plan)
}

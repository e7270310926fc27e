//! One-line US address parsing and normalization

use serde::{Deserialize, Serialize};

/// Longest address we accept from a client
pub const MAX_ADDRESS_LEN: usize = 256;

/// Best-effort components of a one-line address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAddress {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

impl ParsedAddress {
    /// Render as "STREET, CITY, ST ZIP", skipping missing parts
    pub fn one_line(&self) -> String {
        let state_zip = match (&self.state, &self.zip) {
            (Some(state), Some(zip)) => Some(format!("{} {}", state, zip)),
            (Some(state), None) => Some(state.clone()),
            (None, Some(zip)) => Some(zip.clone()),
            (None, None) => None,
        };

        [self.street.clone(), self.city.clone(), state_zip]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Address is empty")]
    Empty,

    #[error("Address exceeds {MAX_ADDRESS_LEN} characters")]
    TooLong,
}

/// Collapse whitespace, uppercase, and strip trailing punctuation
pub fn normalize_address(input: &str) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(|c: char| c == '.' || c == ',' || c == ';')
        .to_uppercase()
}

/// Parse "123 Main St, Springfield, IL 62704" style input
pub fn parse_address(input: &str) -> Result<ParsedAddress, AddressError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AddressError::Empty);
    }
    if trimmed.chars().count() > MAX_ADDRESS_LEN {
        return Err(AddressError::TooLong);
    }

    let mut segments: Vec<String> = trimmed
        .split(',')
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .collect();

    let mut parsed = ParsedAddress::default();

    // Peel "ST ZIP" / "ST" / "ZIP" off the last segment, or off the tail of it
    if let Some(last) = segments.pop() {
        let mut words: Vec<String> = last.split(' ').map(str::to_string).collect();

        if let Some(zip) = words.last().and_then(|w| parse_zip(w)) {
            parsed.zip = Some(zip);
            words.pop();
        }
        // "..., IL, 62704": a bare ZIP segment puts the state one segment back
        if words.is_empty() && parsed.zip.is_some() {
            if let Some(prev) = segments.pop() {
                words = prev.split(' ').map(str::to_string).collect();
            }
        }
        // A lone "742 Evergreen Ct" must not lose "Ct" to Connecticut
        let may_hold_state = parsed.zip.is_some() || !segments.is_empty();
        if let Some(state) = words
            .last()
            .filter(|_| may_hold_state)
            .and_then(|w| parse_state(w))
        {
            parsed.state = Some(state);
            words.pop();
        }

        if !words.is_empty() {
            segments.push(words.join(" "));
        }
    }

    match segments.len() {
        0 => {}
        1 => parsed.street = segments.pop(),
        _ => {
            parsed.city = segments.pop();
            parsed.street = Some(segments.join(", "));
        }
    }

    Ok(parsed)
}

/// 5-digit ZIP or ZIP+4 (truncated to 5)
fn parse_zip(word: &str) -> Option<String> {
    let base = word.split('-').next()?;
    if base.len() == 5 && base.bytes().all(|b| b.is_ascii_digit()) {
        Some(base.to_string())
    } else {
        None
    }
}

fn parse_state(word: &str) -> Option<String> {
    let upper = word.trim_end_matches('.').to_uppercase();
    US_STATES.contains(&upper.as_str()).then_some(upper)
}

const US_STATES: [&str; 56] = [
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY", "PR", "GU", "VI", "AS", "MP",
];

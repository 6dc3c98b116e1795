use chrono::TimeDelta;
use itertools::Itertools;

use crate::domain::types::{ShipmentId, VehicleId};
use crate::error::RoutingError;
use crate::utils::parse_clock;

/// Special-handling instruction attached to a shipment.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    VehicleRestricted(VehicleId),
    LateArrival(TimeDelta),
    WrongAddress,
    MustShipWith(Vec<ShipmentId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    VehicleRestricted,
    LateArrival,
    WrongAddress,
    MustShipWith,
}

/// Prefix vocabulary mapping free-text notes to directives.
#[derive(Debug, Clone)]
pub struct DirectiveParser {
    vocabulary: Vec<(String, DirectiveKind)>,
}

impl Default for DirectiveParser {
    fn default() -> Self {
        DirectiveParser {
            vocabulary: vec![
                ("can only be on truck".into(), DirectiveKind::VehicleRestricted),
                ("delayed on flight".into(), DirectiveKind::LateArrival),
                ("wrong address listed".into(), DirectiveKind::WrongAddress),
                ("must be delivered with".into(), DirectiveKind::MustShipWith),
            ],
        }
    }
}

impl DirectiveParser {
    /// Registers an extra prefix. Matching is case-insensitive.
    pub fn with_prefix(mut self, prefix: &str, kind: DirectiveKind) -> Self {
        self.vocabulary
            .push((prefix.trim().to_ascii_lowercase(), kind));
        self
    }

    /// `Ok(None)` for blank notes or notes outside the vocabulary.
    pub fn parse(&self, note: &str) -> Result<Option<Directive>, RoutingError> {
        let trimmed = note.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let lowered = trimmed.to_ascii_lowercase();

        let Some((prefix, kind)) = self
            .vocabulary
            .iter()
            .find(|(prefix, _)| lowered.starts_with(prefix.as_str()))
        else {
            return Ok(None);
        };
        let rest = &lowered[prefix.len()..];

        let directive = match kind {
            DirectiveKind::VehicleRestricted => {
                let vehicle = numbers_in(rest)
                    .next()
                    .ok_or_else(|| malformed(trimmed, "no vehicle number"))?;
                Directive::VehicleRestricted(vehicle as VehicleId)
            }
            DirectiveKind::LateArrival => {
                let ready = ready_time_in(rest).ok_or_else(|| malformed(trimmed, "no arrival time"))?;
                Directive::LateArrival(ready)
            }
            DirectiveKind::WrongAddress => Directive::WrongAddress,
            DirectiveKind::MustShipWith => {
                let ids: Vec<ShipmentId> = numbers_in(rest).unique().collect();
                if ids.is_empty() {
                    return Err(malformed(trimmed, "no shipment ids"));
                }
                Directive::MustShipWith(ids)
            }
        };
        Ok(Some(directive))
    }
}

fn numbers_in(text: &str) -> impl Iterator<Item = u32> + '_ {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
}

fn ready_time_in(text: &str) -> Option<TimeDelta> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.iter().enumerate().find_map(|(i, token)| {
        let start = token.find(|c: char| c.is_ascii_digit())?;
        let candidate = &token[start..];
        if !candidate.contains(':') {
            return None;
        }
        match tokens.get(i + 1) {
            Some(next) => parse_clock(&format!("{} {}", candidate, next))
                .or_else(|| parse_clock(candidate)),
            None => parse_clock(candidate),
        }
    })
}

fn malformed(note: &str, reason: &str) -> RoutingError {
    RoutingError::MalformedDirective {
        note: note.to_string(),
        reason: reason.to_string(),
    }
}

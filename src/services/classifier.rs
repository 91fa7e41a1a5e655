//! Alert classification: severity, message text and identity

use crate::domain::types::{Alert, AlertKind, RiskGrade, Severity, Zone};

/// Severity is a pure function of kind and grade. Exits are always
/// informational.
pub fn severity_for(kind: AlertKind, grade: RiskGrade) -> Severity {
    match kind {
        AlertKind::Exit => Severity::Low,
        AlertKind::Entry | AlertKind::BuddyRequest => match grade {
            RiskGrade::C | RiskGrade::D | RiskGrade::F => Severity::High,
            RiskGrade::B => Severity::Medium,
            RiskGrade::A | RiskGrade::APlus => Severity::Low,
        },
    }
}

pub fn message_for(kind: AlertKind, severity: Severity, zone: &Zone) -> String {
    match (kind, severity) {
        (AlertKind::Entry, Severity::High) => format!(
            "Entering {} (grade {}), a high-crime area. Consider walking with a buddy.",
            zone.name, zone.grade
        ),
        (AlertKind::Entry, Severity::Medium) => format!(
            "Entering {} (grade {}). Stay aware of your surroundings and keep to busy streets.",
            zone.name, zone.grade
        ),
        (AlertKind::Entry, Severity::Low) => {
            format!("Entering {} (grade {}). This area is considered relatively safe.", zone.name, zone.grade)
        }
        (AlertKind::Exit, _) => format!("You have left {}. Take care out there.", zone.name),
        (AlertKind::BuddyRequest, _) => {
            format!("Buddy request sent for {}. Looking for someone nearby to walk with you.", zone.name)
        }
    }
}

/// Builds alerts with identities unique within one session
///
/// The id joins zone, kind and generation time with a per-classifier
/// sequence number, so two alerts generated in the same millisecond for
/// the same zone and kind still differ.
#[derive(Debug, Default)]
pub struct AlertClassifier {
    seq: u64,
}

impl AlertClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&mut self, kind: AlertKind, zone: &Zone, ts: u64) -> Alert {
        let severity = severity_for(kind, zone.grade);
        self.seq += 1;
        Alert {
            id: format!("{}-{}-{}-{}", zone.id, kind.as_str(), ts, self.seq),
            kind,
            zone: zone.clone(),
            ts,
            severity,
            message: message_for(kind, severity, zone),
        }
    }

    /// Number of alerts generated so far
    pub fn generated(&self) -> u64 {
        self.seq
    }
}

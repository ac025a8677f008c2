//! Status taxonomy shared by the whole canonical layer.
//!
//! Every command in the `cm_*` surface returns `Result<_, Status>`. A
//! [`Status`] carries a stable numeric code and a short token so the
//! external reporter can map it to text without knowing the enum layout.
//! Serialized with serde's adjacently-tagged representation:
//! `{ "kind": "<variant>", "detail": <payload> }`.

/// Error statuses returned by canonical machine operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error, serde::Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum Status {
    /// The planner queue has no free buffer. Transient: the caller should
    /// re-drive the same block on the next dispatcher iteration.
    #[error("planner queue is full")]
    PlannerFull,

    /// More than one word from the same modal group appeared in a block.
    #[error("modal group violation")]
    ModalGroupViolation,

    /// A feed move (G1/G2/G3/G38.2) was commanded with no feed rate set
    /// while in units-per-minute mode.
    #[error("feed rate not set")]
    FeedRateNotSet,

    /// The arc words do not describe a drawable arc: both radius and
    /// center forms given, neither given, or a radius smaller than half
    /// the chord.
    #[error("arc specification error: {0}")]
    ArcSpecification(String),

    /// A coordinate-system selector (G10 P word, G54–G59) is outside the
    /// nine programmable systems.
    #[error("invalid coordinate system")]
    InvalidCoordSystem,

    /// A G10 block carried an L word other than 2.
    #[error("unsupported L word")]
    UnsupportedLWord,

    /// The commanded target lies outside the axis travel envelope.
    #[error("target exceeds maximum travel on axis {axis}")]
    TravelExceeded { axis: usize },

    /// A motion command arrived while the machine is alarmed.
    #[error("machine is in alarm state")]
    MachineAlarmed,

    /// A memory-integrity marker was found corrupted. Fatal: raises the
    /// alarm and halts all motion.
    #[error("memory integrity fault")]
    IntegrityFault,

    /// A homing search move finished without the switch tripping.
    #[error("homing cycle failed: switch never hit on axis {axis}")]
    HomingCycleFailed { axis: usize },

    /// A probe move finished without the probe making contact.
    #[error("probe cycle failed to trigger within travel")]
    ProbeCycleFailed,

    /// The settings file could not be parsed or failed validation. The
    /// inner error is stringified at the boundary so the variant stays
    /// serializable.
    #[error("config error: {0}")]
    Config(String),

    /// An I/O error from the settings store, stringified at the boundary.
    #[error("{0}")]
    Io(String),
}

impl Status {
    /// Stable numeric code reported alongside the token.
    pub fn code(&self) -> u16 {
        match self {
            Status::PlannerFull => 1,
            Status::ModalGroupViolation => 20,
            Status::FeedRateNotSet => 21,
            Status::ArcSpecification(_) => 22,
            Status::InvalidCoordSystem => 23,
            Status::UnsupportedLWord => 24,
            Status::TravelExceeded { .. } => 25,
            Status::MachineAlarmed => 40,
            Status::IntegrityFault => 41,
            Status::HomingCycleFailed { .. } => 50,
            Status::ProbeCycleFailed => 51,
            Status::Config(_) => 60,
            Status::Io(_) => 61,
        }
    }

    /// Short token the reporter maps to display text.
    pub fn token(&self) -> &'static str {
        match self {
            Status::PlannerFull => "again",
            Status::ModalGroupViolation => "modal",
            Status::FeedRateNotSet => "feed",
            Status::ArcSpecification(_) => "arc",
            Status::InvalidCoordSystem => "coord",
            Status::UnsupportedLWord => "lword",
            Status::TravelExceeded { .. } => "travel",
            Status::MachineAlarmed => "alarm",
            Status::IntegrityFault => "magic",
            Status::HomingCycleFailed { .. } => "home",
            Status::ProbeCycleFailed => "probe",
            Status::Config(_) => "config",
            Status::Io(_) => "io",
        }
    }

    /// True for statuses the dispatcher should retry rather than report.
    pub fn is_transient(&self) -> bool {
        matches!(self, Status::PlannerFull)
    }
}

impl From<std::io::Error> for Status {
    fn from(e: std::io::Error) -> Self {
        Status::Io(e.to_string())
    }
}

impl From<toml::de::Error> for Status {
    fn from(e: toml::de::Error) -> Self {
        Status::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        let all = [
            Status::PlannerFull,
            Status::ModalGroupViolation,
            Status::FeedRateNotSet,
            Status::ArcSpecification(String::new()),
            Status::InvalidCoordSystem,
            Status::UnsupportedLWord,
            Status::TravelExceeded { axis: 0 },
            Status::MachineAlarmed,
            Status::IntegrityFault,
            Status::HomingCycleFailed { axis: 0 },
            Status::ProbeCycleFailed,
            Status::Config(String::new()),
            Status::Io(String::new()),
        ];
        let mut codes: Vec<u16> = all.iter().map(Status::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len(), "duplicate status code");
    }

    #[test]
    fn planner_full_is_the_only_transient_status() {
        assert!(Status::PlannerFull.is_transient());
        assert!(!Status::FeedRateNotSet.is_transient());
        assert!(!Status::MachineAlarmed.is_transient());
    }

    #[test]
    fn status_serializes_to_kind_detail() {
        let value = serde_json::to_value(Status::FeedRateNotSet).expect("serialize");
        assert_eq!(value["kind"], "FeedRateNotSet");

        let value =
            serde_json::to_value(Status::TravelExceeded { axis: 2 }).expect("serialize");
        assert_eq!(value["kind"], "TravelExceeded");
        assert_eq!(value["detail"]["axis"], 2);

        let value = serde_json::to_value(Status::Config("bad toml".to_string()))
            .expect("serialize");
        assert_eq!(value["kind"], "Config");
        assert_eq!(value["detail"], "bad toml");
    }

    #[test]
    fn from_io_error_produces_io_variant() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let status = Status::from(io_err);
        assert!(matches!(status, Status::Io(_)));
        assert_eq!(status.token(), "io");
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(Status::FeedRateNotSet.to_string(), "feed rate not set");
        assert_eq!(
            Status::TravelExceeded { axis: 1 }.to_string(),
            "target exceeds maximum travel on axis 1"
        );
    }
}

use std::fmt;

use crate::models::command_models::{CommandV1Data, ModeSelection, ReactiveMode, RealMode};

// --------------------------------------------------------------------------------------------------------------
// Battery command interpretation
//
// Pure decision step: a command payload goes in, a loggable effect record comes out. No
// device is touched here; whoever consumes the effect decides what to do with it.
// --------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealModeVariant {
    Charge,
    Discharge,
    SelfConsumption,
    ChargeOnlySelfConsumption,
    /// `realMode` present but none of its members set.
    Unknown,
    /// `realMode` absent or null.
    Missing,
}

impl From<&RealMode> for RealModeVariant {
    fn from(mode: &RealMode) -> Self {
        match mode {
            RealMode::Charge { .. }             => RealModeVariant::Charge,
            RealMode::Discharge { .. }          => RealModeVariant::Discharge,
            RealMode::SelfConsumption           => RealModeVariant::SelfConsumption,
            RealMode::ChargeOnlySelfConsumption => RealModeVariant::ChargeOnlySelfConsumption,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealModeEffect {
    pub variant: RealModeVariant,
    pub power_w: Option<i32>,
    /// Lower-precedence variants that were also populated and got dropped.
    pub ignored: Vec<RealModeVariant>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReactiveModeEffect {
    Missing,
    Unknown,
    Apply { mode: ReactiveMode, ignored: Vec<ReactiveMode> },
}

/// `durationSeconds` as reported: never defaulted to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationEffect {
    Seconds(i32),
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandEffect {
    pub device_id:  String,
    pub real:       RealModeEffect,
    pub reactive:   ReactiveModeEffect,
    pub start_time: Option<String>,
    pub duration:   DurationEffect,
}

impl CommandEffect {
    /// True when the command carries everything needed to act on it.
    pub fn is_actionable(&self) -> bool {
        !matches!(self.real.variant, RealModeVariant::Missing | RealModeVariant::Unknown)
            && matches!(self.duration, DurationEffect::Seconds(_))
    }
}

// --------------------------------------------------------------------------------------------------------------

/// Derive the effect of one command. Total over every payload; several populated real-mode
/// variants resolve as charge > discharge > selfConsumption > chargeOnlySelfConsumption.
pub fn interpret(payload: &CommandV1Data) -> CommandEffect {
    CommandEffect {
        device_id:  payload.device_id.clone(),
        real:       interpret_real_mode(payload),
        reactive:   interpret_reactive_mode(payload),
        start_time: payload.start_time.clone(),
        duration:   match payload.duration_seconds {
            Some(seconds) => DurationEffect::Seconds(seconds),
            None          => DurationEffect::Missing,
        },
    }
}

fn interpret_real_mode(payload: &CommandV1Data) -> RealModeEffect {
    let selection = match &payload.real_mode {
        Some(real_mode) => real_mode.selection(),
        None => ModeSelection::Missing,
    };

    match selection {
        ModeSelection::Missing => RealModeEffect { variant: RealModeVariant::Missing, power_w: None, ignored: Vec::new() },
        ModeSelection::Unknown => RealModeEffect { variant: RealModeVariant::Unknown, power_w: None, ignored: Vec::new() },
        ModeSelection::Single(mode) => RealModeEffect {
            variant: RealModeVariant::from(&mode),
            power_w: mode.power_w(),
            ignored: Vec::new(),
        },
        ModeSelection::Conflicting { chosen, ignored } => RealModeEffect {
            variant: RealModeVariant::from(&chosen),
            power_w: chosen.power_w(),
            ignored: ignored.iter().map(RealModeVariant::from).collect(),
        },
    }
}

fn interpret_reactive_mode(payload: &CommandV1Data) -> ReactiveModeEffect {
    let selection = match &payload.reactive_mode {
        Some(reactive_mode) => reactive_mode.selection(),
        None => ModeSelection::Missing,
    };

    match selection {
        ModeSelection::Missing      => ReactiveModeEffect::Missing,
        ModeSelection::Unknown      => ReactiveModeEffect::Unknown,
        ModeSelection::Single(mode) => ReactiveModeEffect::Apply { mode, ignored: Vec::new() },
        ModeSelection::Conflicting { chosen, ignored } => ReactiveModeEffect::Apply { mode: chosen, ignored },
    }
}

// --------------------------------------------------------------------------------------------------------------

impl fmt::Display for RealModeEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.variant, self.power_w) {
            (RealModeVariant::Missing, _)  => write!(f, "realMode missing"),
            (RealModeVariant::Unknown, _)  => write!(f, "unknown realMode command type"),
            (variant, Some(power_w))       => write!(f, "{:?} {}W", variant, power_w),
            (variant, None)                => write!(f, "{:?}", variant),
        }
    }
}

impl fmt::Display for ReactiveModeEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactiveModeEffect::Missing => write!(f, "none"),
            ReactiveModeEffect::Unknown => write!(f, "unknown reactiveMode command type"),
            ReactiveModeEffect::Apply { mode, .. } => match mode {
                ReactiveMode::PowerFactorCorrection { target_power_factor } => {
                    write!(f, "{} pf={:.2}", mode.name(), target_power_factor)
                }
                ReactiveMode::Inject { reactive_power_var } | ReactiveMode::Absorb { reactive_power_var } => {
                    write!(f, "{} {}var", mode.name(), reactive_power_var)
                }
            },
        }
    }
}

impl fmt::Display for DurationEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationEffect::Seconds(seconds) => write!(f, "{}s", seconds),
            DurationEffect::Missing          => write!(f, "durationSeconds missing"),
        }
    }
}

// --------------------------------------------------------------------------------------------------------------

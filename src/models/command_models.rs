use serde::{Deserialize, Serialize};
use serde_json::Value;

// --------------------------------------------------------------------------------------------------------------
// Battery-inverter command payload (type com.evergen.energy.battery-inverter.command.v1)
//
// realMode and reactiveMode arrive as objects with one optional member per variant:
//   "realMode":     {"chargeCommand": {"powerW": 500}}
//   "reactiveMode": {"inject": {"reactivePowerVar": 200}}
// Exactly one member is expected; the selection helpers below turn the wire form into a
// sum type where "none", "unknown" and "several" are explicit states.
// --------------------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandV1Data {
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_mode: Option<RealModeCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reactive_mode: Option<ReactiveModeCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PowerSetpoint {
    pub power_w: i32,
}

/// Wire form of the real-power mode. Short member names (`charge`, ...) are accepted too.
/// Both spellings fill the same field, so an object carrying `charge` and `chargeCommand`
/// together is rejected as a duplicate field and fails the payload shape check.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RealModeCommand {
    #[serde(alias = "charge", default, skip_serializing_if = "Option::is_none")]
    pub charge_command: Option<PowerSetpoint>,
    #[serde(alias = "discharge", default, skip_serializing_if = "Option::is_none")]
    pub discharge_command: Option<PowerSetpoint>,
    /// Marker variant; any non-null value (usually `{}`) selects it.
    #[serde(alias = "selfConsumption", default, skip_serializing_if = "Option::is_none")]
    pub self_consumption_command: Option<Value>,
    #[serde(alias = "chargeOnlySelfConsumption", default, skip_serializing_if = "Option::is_none")]
    pub charge_only_self_consumption_command: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealMode {
    Charge { power_w: i32 },
    Discharge { power_w: i32 },
    SelfConsumption,
    ChargeOnlySelfConsumption,
}

impl RealMode {
    pub fn power_w(&self) -> Option<i32> {
        match self {
            RealMode::Charge { power_w } | RealMode::Discharge { power_w } => Some(*power_w),
            _ => None,
        }
    }
}

/// Which variant(s) a mode object carried.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeSelection<M> {
    /// The mode object itself was absent or null.
    Missing,
    /// The mode object was present but none of its known members were set.
    Unknown,
    Single(M),
    /// Several members were set. `chosen` is the highest-precedence one.
    Conflicting { chosen: M, ignored: Vec<M> },
}

impl<M> ModeSelection<M> {
    fn from_ordered(mut populated: Vec<M>) -> Self {
        match populated.len() {
            0 => ModeSelection::Unknown,
            1 => ModeSelection::Single(populated.remove(0)),
            _ => {
                let chosen = populated.remove(0);
                ModeSelection::Conflicting { chosen, ignored: populated }
            }
        }
    }

    /// The variant that takes effect, if any.
    pub fn effective(&self) -> Option<&M> {
        match self {
            ModeSelection::Single(mode) | ModeSelection::Conflicting { chosen: mode, .. } => Some(mode),
            ModeSelection::Missing | ModeSelection::Unknown => None,
        }
    }
}

impl RealModeCommand {
    /// Populated variants in precedence order: charge, discharge, self-consumption,
    /// charge-only self-consumption.
    pub fn populated(&self) -> Vec<RealMode> {
        let mut modes = Vec::new();
        if let Some(setpoint) = self.charge_command {
            modes.push(RealMode::Charge { power_w: setpoint.power_w });
        }
        if let Some(setpoint) = self.discharge_command {
            modes.push(RealMode::Discharge { power_w: setpoint.power_w });
        }
        if is_set(&self.self_consumption_command) {
            modes.push(RealMode::SelfConsumption);
        }
        if is_set(&self.charge_only_self_consumption_command) {
            modes.push(RealMode::ChargeOnlySelfConsumption);
        }
        modes
    }

    pub fn selection(&self) -> ModeSelection<RealMode> {
        ModeSelection::from_ordered(self.populated())
    }
}

fn is_set(marker: &Option<Value>) -> bool {
    matches!(marker, Some(v) if !v.is_null())
}

/// Build the wire form for a single real-mode variant.
impl From<RealMode> for RealModeCommand {
    fn from(mode: RealMode) -> Self {
        let mut command = RealModeCommand::default();
        match mode {
            RealMode::Charge { power_w }    => command.charge_command = Some(PowerSetpoint { power_w }),
            RealMode::Discharge { power_w } => command.discharge_command = Some(PowerSetpoint { power_w }),
            RealMode::SelfConsumption => {
                command.self_consumption_command = Some(Value::Object(Default::default()))
            }
            RealMode::ChargeOnlySelfConsumption => {
                command.charge_only_self_consumption_command = Some(Value::Object(Default::default()))
            }
        }
        command
    }
}

// --------------------------------------------------------------------------------------------------------------
// Reactive-power mode

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PowerFactorCorrection {
    pub target_power_factor: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReactivePowerSetpoint {
    pub reactive_power_var: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReactiveModeCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_factor_correction: Option<PowerFactorCorrection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inject: Option<ReactivePowerSetpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absorb: Option<ReactivePowerSetpoint>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReactiveMode {
    PowerFactorCorrection { target_power_factor: f64 },
    Inject { reactive_power_var: i32 },
    Absorb { reactive_power_var: i32 },
}

impl ReactiveMode {
    pub fn name(&self) -> &'static str {
        match self {
            ReactiveMode::PowerFactorCorrection { .. } => "powerFactorCorrection",
            ReactiveMode::Inject { .. }                => "inject",
            ReactiveMode::Absorb { .. }                => "absorb",
        }
    }
}

impl ReactiveModeCommand {
    /// Populated variants in precedence order: power-factor correction, inject, absorb.
    pub fn populated(&self) -> Vec<ReactiveMode> {
        let mut modes = Vec::new();
        if let Some(pfc) = self.power_factor_correction {
            modes.push(ReactiveMode::PowerFactorCorrection { target_power_factor: pfc.target_power_factor });
        }
        if let Some(setpoint) = self.inject {
            modes.push(ReactiveMode::Inject { reactive_power_var: setpoint.reactive_power_var });
        }
        if let Some(setpoint) = self.absorb {
            modes.push(ReactiveMode::Absorb { reactive_power_var: setpoint.reactive_power_var });
        }
        modes
    }

    pub fn selection(&self) -> ModeSelection<ReactiveMode> {
        ModeSelection::from_ordered(self.populated())
    }
}

// --------------------------------------------------------------------------------------------------------------

// --------------------------------------------------------------------------------------------------------------
// Event type strings carried in the envelope `type` attribute.
// --------------------------------------------------------------------------------------------------------------

pub const ONBOARDING_REQUEST_V1:     &str = "com.evergen.energy.onboarding-request.v1";
pub const OFFBOARDING_REQUEST_V1:    &str = "com.evergen.energy.offboarding-request.v1";
pub const BATTERY_COMMAND_V1:        &str = "com.evergen.energy.battery-inverter.command.v1";
pub const ONBOARDING_RESPONSE_V1:    &str = "com.evergen.energy.onboarding-response.v1";
pub const OFFBOARDING_RESPONSE_V1:   &str = "com.evergen.energy.offboarding-response.v1";
pub const TELEMETRY_V1:              &str = "com.evergen.energy.telemetry.v1";

use serde::{Deserialize, Serialize};

// --------------------------------------------------------------------------------------------------------------
// Onboarding / offboarding payloads and the static site description that may accompany an
// onboarding response.
// --------------------------------------------------------------------------------------------------------------

pub const STATUS_CONNECTED:     &str = "connected";
pub const STATUS_NOT_CONNECTED: &str = "not-connected";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingRequestV1Data {
    #[serde(default)]
    pub serial_number: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OffboardingRequestV1Data {
    #[serde(default)]
    pub serial_number: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingResponseV1Data {
    pub serial_number: String,
    pub device_id: String,
    /// "connected" or "not-connected" by convention; not a closed set.
    pub connection_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_static_data: Option<SiteStaticDataV1>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OffboardingResponseV1Data {
    pub serial_number: String,
    pub device_id: String,
    pub connection_status: String,
}

// --------------------------------------------------------------------------------------------------------------
// Site static data

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteStaticDataV1 {
    pub site_id:                       String,
    pub unique_meter_identifier:       Option<String>,
    pub country:                       Option<String>,
    pub distribution_network_operator: Option<String>,
    pub state:                         Option<String>,
    pub postcode:                      Option<String>,
    pub address:                       Option<String>,
    pub export_limit_w:                Option<i32>,
    pub batteries_static_data:         Vec<BatteryStaticData>,
    pub battery_inverters_static_data: Vec<BatteryInverterStaticData>,
    pub hybrid_inverters_static_data:  Vec<HybridInverterStaticData>,
    pub solar_inverters_static_data:   Vec<SolarInverterStaticData>,
    pub meters_static_data:            Vec<MeterStaticData>,
}

/// Identity fields shared by every static device record.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceIdentity {
    pub device_id:     String,
    pub serial_number: String,
    pub manufacturer:  Option<String>,
    pub model:         Option<String>,
    pub firmware:      Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BatteryStaticData {
    #[serde(flatten)]
    pub identity: DeviceIdentity,
    pub nameplate_energy_capacity_wh:          i64,
    pub max_charge_power_w:                    i32,
    pub max_discharge_power_w:                 i32,
    pub cumulative_battery_charge_energy_wh:   i64,
    pub cumulative_battery_discharge_energy_wh: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BatteryInverterStaticData {
    #[serde(flatten)]
    pub identity: DeviceIdentity,
    pub installation_date:             Option<String>,
    pub battery_inverter_ac_capacity_w: i32,
    pub solar_inverter_ac_capacity_w:  i32,
    pub connected_battery_ids:         Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HybridInverterStaticData {
    #[serde(flatten)]
    pub identity: DeviceIdentity,
    pub installation_date:             Option<String>,
    pub hybrid_inverter_ac_capacity_w: i32,
    pub solar_array_rated_dc_output_w: i32,
    pub solar_inverter_ac_capacity_w:  i32,
    pub connected_battery_ids:         Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SolarInverterStaticData {
    #[serde(flatten)]
    pub identity: DeviceIdentity,
    pub installation_date:             Option<String>,
    pub solar_inverter_ac_capacity_w:  i32,
    pub solar_array_rated_dc_output_w: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MeterStaticData {
    #[serde(flatten)]
    pub identity: DeviceIdentity,
    pub phase:                  i32,
    pub has_controllable_load:  bool,
}

// --------------------------------------------------------------------------------------------------------------

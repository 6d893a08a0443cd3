use serde::{Deserialize, Serialize};

// --------------------------------------------------------------------------------------------------------------
// Telemetry payload (type com.evergen.energy.telemetry.v1)
//
// One payload per site, readings grouped by device class. Nullable fields stand for sensors
// a device does not have, e.g. phases 2/3 on a single-phase inverter.
// Sign conventions: battery power positive = charging, meter power positive = import.
// --------------------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryV1Data {
    pub site_id: String,
    #[serde(default)]
    pub battery_inverters: Vec<BatteryInverterReading>,
    #[serde(default)]
    pub hybrid_inverters: Vec<HybridInverterReading>,
    #[serde(default)]
    pub solar_inverters: Vec<SolarInverterReading>,
    #[serde(default)]
    pub meters: Vec<MeterReading>,
}

impl TelemetryV1Data {
    pub fn device_count(&self) -> usize {
        self.battery_inverters.len() + self.hybrid_inverters.len() + self.solar_inverters.len() + self.meters.len()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BatteryInverterReading {
    pub device_id:                              String,
    pub device_time:                            String,   // RFC 3339, device clock
    pub battery_power_w:                        i32,
    pub meter_power_w:                          i32,
    pub solar_power_w:                          i32,
    pub battery_reactive_power_var:             i32,
    pub solar_reactive_power_var:               Option<i32>,
    pub meter_reactive_power_var:               Option<i32>,
    pub grid_voltage1_v:                        f64,
    pub grid_voltage2_v:                        Option<f64>,
    pub grid_voltage3_v:                        Option<f64>,
    pub grid_frequency_hz:                      f64,
    pub cumulative_battery_charge_energy_wh:    f64,
    pub cumulative_battery_discharge_energy_wh: f64,
    pub cumulative_pv_generation_wh:            Option<f64>,
    pub cumulative_grid_import_wh:              Option<f64>,
    pub cumulative_grid_export_wh:              Option<f64>,
    pub state_of_charge:                        f64,      // 0.0 - 1.0
    pub state_of_health:                        f64,      // 0.0 - 1.0
    pub max_charge_power_w:                     i32,
    pub max_discharge_power_w:                  i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HybridInverterReading {
    pub device_id:                              String,
    pub device_time:                            String,
    pub battery_power_w:                        i32,
    pub meter_power_w:                          i32,
    pub solar_power_w:                          i32,
    pub battery_reactive_power_var:             i32,
    pub meter_reactive_power_var:               Option<i32>,
    pub grid_voltage1_v:                        f64,
    pub grid_voltage2_v:                        Option<f64>,
    pub grid_voltage3_v:                        Option<f64>,
    pub grid_frequency_hz:                      f64,
    pub cumulative_battery_charge_energy_wh:    f64,
    pub cumulative_battery_discharge_energy_wh: f64,
    pub cumulative_pv_generation_wh:            Option<f64>,
    pub cumulative_grid_import_wh:              Option<f64>,
    pub cumulative_grid_export_wh:              Option<f64>,
    pub state_of_charge:                        f64,
    pub state_of_health:                        f64,
    pub max_charge_power_w:                     i32,
    pub max_discharge_power_w:                  i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SolarInverterReading {
    pub device_id:                String,
    pub device_time:              String,
    pub power_w:                  i32,
    pub reactive_power_var:       i32,
    pub grid_voltage1_v:          f64,
    pub grid_voltage2_v:          Option<f64>,
    pub grid_voltage3_v:          Option<f64>,
    pub grid_frequency_hz:        Option<f64>,
    pub cumulative_generation_wh: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MeterReading {
    pub device_id:                 String,
    pub device_time:               String,
    pub power_w:                   i32,
    pub reactive_power_var:        i32,
    pub grid_voltage1_v:           f64,
    pub grid_voltage2_v:           Option<f64>,
    pub grid_voltage3_v:           Option<f64>,
    pub grid_frequency_hz:         f64,
    pub cumulative_grid_import_wh: f64,
    pub cumulative_grid_export_wh: f64,
}

// --------------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn phase_numbers_keep_their_wire_spelling() {
        let reading = BatteryInverterReading {
            device_id:       "Device123".into(),
            grid_voltage1_v: 230.0,
            ..Default::default()
        };
        let wire = serde_json::to_value(&reading).expect("serialises");

        assert_eq!(wire["gridVoltage1V"], json!(230.0));
        assert_eq!(wire["gridVoltage2V"], json!(null));
        assert_eq!(wire["cumulativePvGenerationWh"], json!(null));
    }

    #[test]
    fn missing_sensor_fields_read_as_none() {
        let data: TelemetryV1Data = serde_json::from_value(json!({
            "siteId": "S1",
            "solarInverters": [{"deviceId": "PV1", "powerW": 1500, "gridVoltage1V": 231.5}]
        }))
        .expect("telemetry");

        assert_eq!(data.device_count(), 1);
        assert_eq!(data.solar_inverters[0].grid_frequency_hz, None);
        assert_eq!(data.solar_inverters[0].power_w, 1500);
        assert!(data.meters.is_empty());
    }
}

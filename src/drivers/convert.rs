use crate::drivers::AcquisitionError;
/// Heat flux in W/m² from the averaged sensor voltage.
///
/// `sensitivity` is the sensor's calibration constant in V per W/m²
/// (e.g. `46.7e-6` for a sensor rated 46.7 µV/(W/m²)).
pub fn convert_flux(raw_voltage: f64, sensitivity: f64) -> Result<f64, AcquisitionError> {
    if sensitivity == 0.0 || !sensitivity.is_finite() {
        return Err(AcquisitionError::Configuration(format!(
            "sensitivity must be a finite non-zero value, got {sensitivity}"
        )));
    }
    Ok(raw_voltage / sensitivity)
}
/// Thermocouple channels are linearized by the driver and already read in °C.
pub fn convert_temperature(celsius: f64) -> f64 {
    celsius
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn flux_is_voltage_over_sensitivity() {
        let flux = convert_flux(0.001, 50e-6).unwrap();
        assert!((flux - 20.0).abs() < 1e-9);
        let flux = convert_flux(-4.67e-4, 46.7e-6).unwrap();
        assert!((flux + 10.0).abs() < 1e-9);
        assert_eq!(convert_flux(0.0, 46.7e-6).unwrap(), 0.0);
    }
    #[test]
    fn zero_sensitivity_is_a_configuration_error() {
        for v in [0.0, 1.0, -3.5, 1e-6] {
            let err = convert_flux(v, 0.0).unwrap_err();
            assert!(matches!(err, AcquisitionError::Configuration(_)));
        }
        assert!(convert_flux(1.0, f64::NAN).is_err());
    }
    #[test]
    fn temperatures_pass_through() {
        assert_eq!(convert_temperature(21.37), 21.37);
    }
}

use time::OffsetDateTime;

/// One timestamped sample from a P1 smart meter.
///
/// Carries exactly the four values the bridge tracks. Readings have no identity
/// beyond `ts`; a source that re-emits a telegram produces a duplicate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub ts: OffsetDateTime,
    /// Delivered electricity, tariff 1 (kWh, accumulated).
    pub electricity_tariff1: f64,
    /// Delivered electricity, tariff 2 (kWh, accumulated).
    pub electricity_tariff2: f64,
    /// Instantaneous delivered power (kW).
    pub electricity_actual: f64,
    /// Gas meter register (m3, accumulated).
    pub gas_reading: f64,
}

/// Column names of the four measured values as stored in the database.
///
/// `tarrif` is misspelled on purpose: existing databases already use these
/// column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldName {
    ElectricityTariff1,
    ElectricityTariff2,
    ElectricityActual,
    GasReading,
}

impl FieldName {
    pub const ALL: [FieldName; 4] = [
        FieldName::ElectricityTariff1,
        FieldName::ElectricityTariff2,
        FieldName::ElectricityActual,
        FieldName::GasReading,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldName::ElectricityTariff1 => "electricity_tarrif1",
            FieldName::ElectricityTariff2 => "electricity_tarrif2",
            FieldName::ElectricityActual => "electricity_actual",
            FieldName::GasReading => "gas_reading",
        }
    }
}

impl Reading {
    /// The measured values in wire order, paired with their column names.
    pub fn fields(&self) -> [(FieldName, f64); 4] {
        [
            (FieldName::ElectricityTariff1, self.electricity_tariff1),
            (FieldName::ElectricityTariff2, self.electricity_tariff2),
            (FieldName::ElectricityActual, self.electricity_actual),
            (FieldName::GasReading, self.gas_reading),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn fields_are_in_wire_order_and_carry_source_values() {
        let r = Reading {
            ts: datetime!(2024-01-01 00:00:00 UTC),
            electricity_tariff1: 1234.5,
            electricity_tariff2: 987.25,
            electricity_actual: 0.42,
            gas_reading: 3210.0,
        };

        let names: Vec<&str> = r.fields().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["electricity_tarrif1", "electricity_tarrif2", "electricity_actual", "gas_reading"]
        );

        let values: Vec<f64> = r.fields().iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![1234.5, 987.25, 0.42, 3210.0]);
    }

    #[test]
    fn all_field_names_match_fields_order() {
        let r = Reading {
            ts: datetime!(2024-01-01 00:00:00 UTC),
            electricity_tariff1: 0.0,
            electricity_tariff2: 0.0,
            electricity_actual: 0.0,
            gas_reading: 0.0,
        };
        let from_fields: Vec<FieldName> = r.fields().iter().map(|(n, _)| *n).collect();
        assert_eq!(from_fields, FieldName::ALL.to_vec());
    }
}

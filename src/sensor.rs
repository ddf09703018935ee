use rand_core::{RngCore, SeedableRng};
use rand_wyrand::WyRand;

/// Bytes one reading occupies: 4-byte sequence + 4-byte sample value.
pub const SENSOR_READING_SIZE: usize = 8;

/// A sampling failure. Non-fatal: the caller enqueues nothing and the
/// next trigger samples again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorReadError {
    /// The sensor has no fresh value yet.
    NotReady,
    /// The underlying driver reported a fault.
    Hardware,
}

#[derive(Clone, Copy, Debug)]
pub struct SensorReading {
    data: [u8; SENSOR_READING_SIZE],
}

impl SensorReading {
    pub fn with(sequence: u32, value: i32) -> Self {
        let mut data = [0u8; SENSOR_READING_SIZE];
        data[0..4].copy_from_slice(&sequence.to_le_bytes());
        data[4..8].copy_from_slice(&value.to_le_bytes());
        SensorReading { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Sampling seam for the hardware sensor driver.
pub trait Sensor {
    fn sample(&mut self) -> Result<SensorReading, SensorReadError>;
}

/// Deterministic stand-in sensor for simulator and demo builds: centi-
/// degree temperature readings jittering around 20.00.
pub struct SyntheticSensor {
    rng: WyRand,
    sequence: u32,
}

impl SyntheticSensor {
    pub fn with(rng_seed: u64) -> Self {
        SyntheticSensor {
            rng: WyRand::seed_from_u64(rng_seed),
            sequence: 0,
        }
    }
}

impl Sensor for SyntheticSensor {
    fn sample(&mut self) -> Result<SensorReading, SensorReadError> {
        self.sequence = self.sequence.wrapping_add(1);
        let jitter = (self.rng.next_u32() % 800) as i32 - 400;
        Ok(SensorReading::with(self.sequence, 2000 + jitter))
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn synthetic_readings_are_sequenced_and_deterministic() {
        let mut a = SyntheticSensor::with(42);
        let mut b = SyntheticSensor::with(42);

        let first = a.sample().unwrap();
        assert_eq!(first.as_bytes()[0..4], 1u32.to_le_bytes());
        assert_eq!(first.as_bytes(), b.sample().unwrap().as_bytes());
        assert_ne!(a.sample().unwrap().as_bytes(), first.as_bytes());
    }

    #[test]
    fn reading_layout_round_trips() {
        let reading = SensorReading::with(7, -125);
        let bytes = reading.as_bytes();
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), 7);
        assert_eq!(i32::from_le_bytes(bytes[4..8].try_into().unwrap()), -125);
    }
}

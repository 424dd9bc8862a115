use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::Value;

use super::constants::{DEFAULT_BLUR_STRENGTH, MAX_BLUR_STRENGTH, MIN_BLUR_STRENGTH};

/// Clamp a requested kernel size into `[1, 51]` and bump even values to
/// the next odd one, so the kernel always has a centre pixel.
pub fn normalize_blur_strength(requested: i64) -> u32 {
    let clamped = requested.clamp(i64::from(MIN_BLUR_STRENGTH), i64::from(MAX_BLUR_STRENGTH)) as u32;
    if clamped % 2 == 0 {
        clamped + 1
    } else {
        clamped
    }
}

/// Best-effort integer reading of a loosely typed request value.
///
/// Integers saturate, floats truncate toward zero, numeric strings are
/// parsed the same way. Anything else reads as the default strength.
pub fn coerce_blur_value(value: Option<&Value>) -> i64 {
    let default = i64::from(DEFAULT_BLUR_STRENGTH);
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|_| i64::MAX))
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(default),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
                .unwrap_or(default)
        }
        Some(Value::Bool(b)) => i64::from(*b),
        _ => default,
    }
}

/// Process-wide blur kernel size, shared between the request that changes
/// it and every frame that reads it.
///
/// The stored value is always normalised; it is written with a single
/// atomic store, so readers never observe an intermediate value.
#[derive(Debug)]
pub struct BlurStrength {
    value: AtomicU32,
}

impl BlurStrength {
    pub fn new(initial: i64) -> Self {
        Self {
            value: AtomicU32::new(normalize_blur_strength(initial)),
        }
    }

    pub fn get(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }

    /// Normalise and store `requested`, returning the value now in effect.
    pub fn set(&self, requested: i64) -> u32 {
        let effective = normalize_blur_strength(requested);
        self.value.store(effective, Ordering::Release);
        log::info!("Blur strength set to {effective} (requested {requested})");
        effective
    }
}

impl Default for BlurStrength {
    fn default() -> Self {
        Self::new(i64::from(DEFAULT_BLUR_STRENGTH))
    }
}

//! Thermal control: the filtered-error law and its duty-cycle output.

pub mod history;
pub mod law;

use core::fmt;

/// Which actuator a task or line drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuatorKind {
    Cool,
    Heat,
}

impl ActuatorKind {
    pub const ALL: [Self; 2] = [Self::Cool, Self::Heat];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Cool => "cool",
            Self::Heat => "heat",
        }
    }
}

impl fmt::Display for ActuatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Clamp to `[0, 1]`; NaN maps to 0 (actuator off).
pub fn clamp_duty(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

/// Cool/heat duty fractions, each always within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DutyCycleCommand {
    cool: f64,
    heat: f64,
}

impl DutyCycleCommand {
    pub const OFF: Self = Self {
        cool: 0.0,
        heat: 0.0,
    };

    pub fn new(cool: f64, heat: f64) -> Self {
        Self {
            cool: clamp_duty(cool),
            heat: clamp_duty(heat),
        }
    }

    pub fn cool(&self) -> f64 {
        self.cool
    }

    pub fn heat(&self) -> f64 {
        self.heat
    }

    pub fn for_actuator(&self, kind: ActuatorKind) -> f64 {
        match kind {
            ActuatorKind::Cool => self.cool,
            ActuatorKind::Heat => self.heat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_is_always_clamped() {
        let c = DutyCycleCommand::new(1.7, -0.3);
        assert_eq!(c.cool(), 1.0);
        assert_eq!(c.heat(), 0.0);
        let c = DutyCycleCommand::new(f64::NAN, f64::INFINITY);
        assert_eq!(c.cool(), 0.0);
        assert_eq!(c.heat(), 1.0);
    }

    #[test]
    fn selects_by_kind() {
        let c = DutyCycleCommand::new(0.25, 0.75);
        assert_eq!(c.for_actuator(ActuatorKind::Cool), 0.25);
        assert_eq!(c.for_actuator(ActuatorKind::Heat), 0.75);
        assert_eq!(ActuatorKind::Heat.to_string(), "heat");
    }
}

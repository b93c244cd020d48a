//! Controllable elements as the balancing loop sees them.
//!
//! Everything here works in **injection sign**: positive means power pushed
//! into the network. Boundary injections already use that convention
//! (export-positive); loads are flipped on the way in and back on the way out.
//! With one sign convention, `new = current - offset * weight` always moves an
//! area's net position towards its target.

use cgm_core::{
    AreaCode, ComponentId, InjectionId, InjectionRecord, LoadId, LoadRecord, Megavars, Megawatts,
};

/// q/p of an element, clamped to `±threshold`. A 0/0 ratio is 0.
pub fn power_factor_ratio(p: Megawatts, q: Megavars, threshold: f64) -> f64 {
    let ratio = q.value() / p.value();
    if ratio.is_nan() {
        0.0
    } else {
        ratio.clamp(-threshold, threshold)
    }
}

/// Anything the participation allocator can move.
pub trait Scalable {
    type Id: Copy;

    fn id(&self) -> Self::Id;

    /// Value that determines the element's share of a correction.
    fn participation_basis(&self) -> f64;

    /// Active power the correction is applied to (injection sign).
    fn active_power(&self) -> Megawatts;

    fn reactive_power(&self) -> Megavars;

    fn power_factor_ratio(&self) -> f64;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalableLoad {
    pub id: LoadId,
    pub area: AreaCode,
    pub component: ComponentId,
    /// Injection sign: a 100 MW load is `-100`
    pub active_power: Megawatts,
    pub reactive_power: Megavars,
    pub conforming: bool,
    pub power_factor_ratio: f64,
}

impl ScalableLoad {
    /// `None` when the load has no area or island.
    pub fn from_record(record: &LoadRecord, power_factor_ratio: f64) -> Option<Self> {
        Some(Self {
            id: record.id,
            area: record.area.clone()?,
            component: record.component?,
            active_power: -record.active_power,
            reactive_power: -record.reactive_power,
            conforming: record.conforming,
            power_factor_ratio,
        })
    }

    /// Consumption-positive setpoint for writing back to the model.
    pub fn consumption(p: Megawatts, q: Megavars) -> (Megawatts, Megavars) {
        (-p, -q)
    }
}

impl Scalable for ScalableLoad {
    type Id = LoadId;

    fn id(&self) -> LoadId {
        self.id
    }

    fn participation_basis(&self) -> f64 {
        self.active_power.value().abs()
    }

    fn active_power(&self) -> Megawatts {
        self.active_power
    }

    fn reactive_power(&self) -> Megavars {
        self.reactive_power
    }

    fn power_factor_ratio(&self) -> f64 {
        self.power_factor_ratio
    }
}

/// Unpaired AC boundary injection used by the one-shot prescale.
///
/// Shares follow the solved flow; the correction lands on the setpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalableInjection {
    pub id: InjectionId,
    pub area: AreaCode,
    pub component: ComponentId,
    pub setpoint_p: Megawatts,
    pub setpoint_q: Megavars,
    pub flow_p: Megawatts,
    pub power_factor_ratio: f64,
}

impl ScalableInjection {
    pub fn from_record(record: &InjectionRecord, power_factor_ratio: f64) -> Option<Self> {
        Some(Self {
            id: record.id,
            area: record.area.clone()?,
            component: record.component?,
            setpoint_p: record.setpoint_p,
            setpoint_q: record.setpoint_q,
            flow_p: record.flow_p,
            power_factor_ratio,
        })
    }
}

impl Scalable for ScalableInjection {
    type Id = InjectionId;

    fn id(&self) -> InjectionId {
        self.id
    }

    fn participation_basis(&self) -> f64 {
        self.flow_p.value().abs()
    }

    fn active_power(&self) -> Megawatts {
        self.setpoint_p
    }

    fn reactive_power(&self) -> Megavars {
        self.setpoint_q
    }

    fn power_factor_ratio(&self) -> f64 {
        self.power_factor_ratio
    }
}

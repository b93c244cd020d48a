use cgm_core::{Megavars, Megawatts};

use crate::elements::Scalable;

/// New setpoint proposed for one element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proposal<Id> {
    pub id: Id,
    pub active_power: Megawatts,
    pub reactive_power: Megavars,
    pub delta: Megawatts,
}

/// Spreads an offset over a set of elements in proportion to their
/// participation basis.
///
/// For a non-empty proposal the deltas sum to `-offset`. When the basis total
/// is zero no element has a defined share and nothing is proposed.
#[derive(Debug, Clone, Copy)]
pub struct ParticipationAllocator {
    constant_power_factor: bool,
}

impl ParticipationAllocator {
    pub fn new(constant_power_factor: bool) -> Self {
        Self {
            constant_power_factor,
        }
    }

    pub fn allocate<T: Scalable>(&self, elements: &[T], offset: Megawatts) -> Vec<Proposal<T::Id>> {
        let total: f64 = elements.iter().map(|e| e.participation_basis()).sum();
        if total <= 0.0 || !total.is_finite() {
            return Vec::new();
        }

        elements
            .iter()
            .map(|element| {
                let weight = element.participation_basis() / total;
                let delta = -(offset * weight);
                let active_power = element.active_power() + delta;
                let reactive_power = if self.constant_power_factor {
                    active_power.scaled_reactive(element.power_factor_ratio())
                } else {
                    element.reactive_power()
                };
                Proposal {
                    id: element.id(),
                    active_power,
                    reactive_power,
                    delta,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::ScalableLoad;
    use cgm_core::{ComponentId, LoadId};

    fn load(id: usize, consumption: f64, q: f64) -> ScalableLoad {
        ScalableLoad {
            id: LoadId::new(id),
            area: "A".into(),
            component: ComponentId::MAIN,
            active_power: Megawatts(-consumption),
            reactive_power: Megavars(-q),
            conforming: true,
            power_factor_ratio: q / consumption,
        }
    }

    #[test]
    fn deltas_sum_to_negative_offset() {
        let loads = vec![load(1, 600.0, 60.0), load(2, 240.0, 12.0), load(3, 33.3, 1.0)];
        for offset in [-40.0, 17.25, 1e-3, 512.0] {
            let proposals = ParticipationAllocator::new(true).allocate(&loads, Megawatts(offset));
            let sum: f64 = proposals.iter().map(|p| p.delta.value()).sum();
            assert!((sum + offset).abs() < 1e-6, "offset {offset}: sum {sum}");
        }
    }

    #[test]
    fn shares_follow_magnitude() {
        let loads = vec![load(1, 600.0, 0.0), load(2, 240.0, 0.0)];
        let proposals = ParticipationAllocator::new(false).allocate(&loads, Megawatts(-42.0));
        assert!((proposals[0].delta.value() - 30.0).abs() < 1e-9);
        assert!((proposals[1].delta.value() - 12.0).abs() < 1e-9);
        // negative offset means too much import: consumption goes down
        assert!((proposals[0].active_power.value() + 570.0).abs() < 1e-9);
    }

    #[test]
    fn constant_power_factor_rescales_reactive() {
        let loads = vec![load(1, 100.0, 20.0)];
        let proposals = ParticipationAllocator::new(true).allocate(&loads, Megawatts(10.0));
        assert!((proposals[0].active_power.value() + 110.0).abs() < 1e-9);
        assert!((proposals[0].reactive_power.value() + 22.0).abs() < 1e-9);

        let kept = ParticipationAllocator::new(false).allocate(&loads, Megawatts(10.0));
        assert_eq!(kept[0].reactive_power, Megavars(-20.0));
    }

    #[test]
    fn zero_total_proposes_nothing() {
        let loads = vec![load(1, 0.0, 0.0), load(2, 0.0, 0.0)];
        assert!(ParticipationAllocator::new(true)
            .allocate(&loads, Megawatts(5.0))
            .is_empty());
        let none: Vec<ScalableLoad> = Vec::new();
        assert!(ParticipationAllocator::new(true)
            .allocate(&none, Megawatts(5.0))
            .is_empty());
    }
}

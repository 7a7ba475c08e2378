//! The route a probe walks through the sample world.

use lib_scoped::config::WorldSettings;
use lib_scoped::requests::SampleRequest;

/// Every default scope in id order, then a fresh extra scope, then Limbo.
pub fn plan(world: &WorldSettings) -> Vec<SampleRequest> {
    let mut stops: Vec<SampleRequest> = (1..=world.default_scopes.len() as u32)
        .map(|index| SampleRequest::DefaultScope { index })
        .collect();
    if !world.extra_scopes.is_empty() {
        stops.push(SampleRequest::ExtraScope { key: None });
    }
    stops.push(SampleRequest::Limbo);
    stops
}

/// Endless iterator over `plan`.
pub struct Tour {
    stops: Vec<SampleRequest>,
    next: usize,
}

impl Tour {
    pub fn new(world: &WorldSettings) -> Self {
        Self {
            stops: plan(world),
            next: 0,
        }
    }
}

impl Iterator for Tour {
    type Item = SampleRequest;

    fn next(&mut self) -> Option<SampleRequest> {
        let stop = self.stops.get(self.next)?.clone();
        self.next = (self.next + 1) % self.stops.len();
        Some(stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_scoped::config::AppConfig;

    #[test]
    fn default_world_tour_loops() {
        let world = AppConfig::default().world;
        let stops: Vec<SampleRequest> = Tour::new(&world).take(5).collect();
        assert_eq!(
            stops,
            vec![
                SampleRequest::DefaultScope { index: 1 },
                SampleRequest::DefaultScope { index: 2 },
                SampleRequest::ExtraScope { key: None },
                SampleRequest::Limbo,
                SampleRequest::DefaultScope { index: 1 },
            ]
        );
    }

    #[test]
    fn empty_world_only_visits_limbo() {
        let world = WorldSettings {
            default_scopes: Vec::new(),
            extra_scopes: Vec::new(),
        };
        assert_eq!(plan(&world), vec![SampleRequest::Limbo]);
    }
}

//! Lamp name to power outlet mapping.
//!
//! Some cal sources are switched through interlocked power outlets on the
//! `kpfpower` service; others (the etalon fiber, the laser frequency comb
//! fiber, the solar cal fiber) are always energized or fed externally and
//! have no controllable outlet. Lamps without an outlet are deliberate
//! no-ops for the power actions.
//!
//! The mapping is passed into the sequencer and power actions at
//! construction rather than living in module-global state, so a deployment
//! with different outlet wiring only has to build a different map.

use std::collections::HashMap;

/// Mapping from cal lamp name to optional power outlet keyword.
#[derive(Clone, Debug)]
pub struct LampPortMap {
    ports: HashMap<String, Option<String>>,
}

impl LampPortMap {
    /// Build a map from explicit lamp/outlet pairs.
    pub fn new(ports: HashMap<String, Option<String>>) -> Self {
        Self { ports }
    }

    /// Outlet keyword for a lamp, if it has one.
    ///
    /// Returns `None` both for lamps mapped to no outlet and for lamps the
    /// map has never heard of; either way the power actions skip them.
    pub fn outlet(&self, lamp: &str) -> Option<&str> {
        self.ports.get(lamp).and_then(|port| port.as_deref())
    }
}

impl Default for LampPortMap {
    /// The cal bench wiring as installed.
    fn default() -> Self {
        let mut ports = HashMap::new();
        ports.insert("EtalonFiber".to_string(), None);
        ports.insert("BrdbandFiber".to_string(), Some("OUTLET_CAL2_2".to_string()));
        ports.insert("U_gold".to_string(), Some("OUTLET_CAL2_7".to_string()));
        ports.insert("U_daily".to_string(), Some("OUTLET_CAL2_8".to_string()));
        ports.insert("Th_daily".to_string(), Some("OUTLET_CAL2_6".to_string()));
        ports.insert("Th_gold".to_string(), Some("OUTLET_CAL2_5".to_string()));
        ports.insert("SoCal-CalFib".to_string(), None);
        ports.insert("LFCFiber".to_string(), None);
        Self { ports }
    }
}

//! Reference stations for the whitewater app.
//!
//! A curated list of Water Survey of Canada gauges that sit on popular
//! paddling sections, with the flow range each section is considered
//! runnable in. It is the default target of a sweep; any other valid
//! station id can still be acquired on demand.

// ---------------------------------------------------------------------------
// Station metadata
// ---------------------------------------------------------------------------

/// Discharge range (m³/s) in which a section is normally paddled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnableRange {
    pub min_runnable_cms: f64,
    pub max_safe_cms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowCondition {
    TooLow,
    Runnable,
    TooHigh,
}

impl RunnableRange {
    pub fn condition(&self, discharge_cms: f64) -> FlowCondition {
        if discharge_cms < self.min_runnable_cms {
            FlowCondition::TooLow
        } else if discharge_cms > self.max_safe_cms {
            FlowCondition::TooHigh
        } else {
            FlowCondition::Runnable
        }
    }
}

impl std::fmt::Display for FlowCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowCondition::TooLow => write!(f, "too low"),
            FlowCondition::Runnable => write!(f, "runnable"),
            FlowCondition::TooHigh => write!(f, "too high"),
        }
    }
}

pub struct Station {
    /// WSC station number, e.g. `05BH004`.
    pub station_id: &'static str,
    pub name: &'static str,
    /// Two-letter province / territory code as GeoMet reports it.
    pub province: &'static str,
    /// Paddling section the gauge is read for.
    pub section: &'static str,
    pub difficulty: &'static str,
    pub runnable: RunnableRange,
    pub latitude: f64,
    pub longitude: f64,
}

const fn range(min_runnable_cms: f64, max_safe_cms: f64) -> RunnableRange {
    RunnableRange { min_runnable_cms, max_safe_cms }
}

pub static STATION_REGISTRY: &[Station] = &[
    Station {
        station_id: "02KF005",
        name: "Ottawa River near Ottawa",
        province: "ON",
        section: "Champlain Bridge",
        difficulty: "Class I-II",
        runnable: range(50.0, 300.0),
        latitude: 45.4215,
        longitude: -75.6919,
    },
    Station {
        station_id: "02KA006",
        name: "Madawaska River at Arnprior",
        province: "ON",
        section: "Lower Madawaska",
        difficulty: "Class II-III",
        runnable: range(15.0, 80.0),
        latitude: 45.4333,
        longitude: -76.3667,
    },
    Station {
        station_id: "02ED003",
        name: "French River near Monetville",
        province: "ON",
        section: "Big Pine Rapids",
        difficulty: "Class II-IV",
        runnable: range(20.0, 100.0),
        latitude: 46.2167,
        longitude: -80.4167,
    },
    Station {
        station_id: "05BH004",
        name: "Bow River at Calgary",
        province: "AB",
        section: "Harvey Passage",
        difficulty: "Class II-III",
        runnable: range(30.0, 150.0),
        latitude: 51.0447,
        longitude: -114.0719,
    },
    Station {
        station_id: "05AD007",
        name: "Kicking Horse River at Golden",
        province: "BC",
        section: "Lower Canyon",
        difficulty: "Class III-IV",
        runnable: range(25.0, 120.0),
        latitude: 51.2967,
        longitude: -116.9633,
    },
    Station {
        station_id: "02KB001",
        name: "Petawawa River near Petawawa",
        province: "ON",
        section: "Five Mile Rapids",
        difficulty: "Class III-IV",
        runnable: range(30.0, 120.0),
        latitude: 45.8833,
        longitude: -77.2833,
    },
    Station {
        station_id: "02KD007",
        name: "Gatineau River near Ottawa",
        province: "QC",
        section: "Paugan Falls",
        difficulty: "Class III",
        runnable: range(20.0, 80.0),
        latitude: 45.4667,
        longitude: -75.8333,
    },
    Station {
        station_id: "02KB008",
        name: "Rouge River at Calumet",
        province: "QC",
        section: "Seven Sisters",
        difficulty: "Class IV-V",
        runnable: range(15.0, 60.0),
        latitude: 45.6167,
        longitude: -74.6333,
    },
    Station {
        station_id: "09AB004",
        name: "Yukon River at Whitehorse",
        province: "YT",
        section: "Whitehorse Rapids",
        difficulty: "Class II-III",
        runnable: range(150.0, 800.0),
        latitude: 60.7167,
        longitude: -135.05,
    },
    Station {
        station_id: "05BJ004",
        name: "Elbow River at Calgary",
        province: "AB",
        section: "Urban Canyon",
        difficulty: "Class II",
        runnable: range(8.0, 40.0),
        latitude: 51.0447,
        longitude: -114.0719,
    },
];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// WSC numbering: two digits, two letters, three digits (`05BH004`).
pub fn is_wsc_station_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() == 7
        && bytes[..2].iter().all(u8::is_ascii_digit)
        && bytes[2..4].iter().all(u8::is_ascii_uppercase)
        && bytes[4..].iter().all(u8::is_ascii_digit)
}

pub fn all_station_ids() -> Vec<&'static str> {
    STATION_REGISTRY.iter().map(|s| s.station_id).collect()
}

/// Case-insensitive lookup.
pub fn find_station(station_id: &str) -> Option<&'static Station> {
    let wanted = station_id.trim();
    STATION_REGISTRY
        .iter()
        .find(|s| s.station_id.eq_ignore_ascii_case(wanted))
}

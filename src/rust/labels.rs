use serde::{Serialize, Serializer};
use std::fmt;

/// Number of classes the scan model distinguishes.
pub const NUM_CLASSES: usize = 3;

/// The class label mapping, indexed by model output position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Diagnosis {
    Covid19Positive,
    Normal,
    ViralPneumonia,
}

impl Diagnosis {
    /// All classes in model output order.
    pub const ALL: [Diagnosis; NUM_CLASSES] = [
        Diagnosis::Covid19Positive,
        Diagnosis::Normal,
        Diagnosis::ViralPneumonia,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            Diagnosis::Covid19Positive => 0,
            Diagnosis::Normal => 1,
            Diagnosis::ViralPneumonia => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Diagnosis::Covid19Positive => "COVID-19 Positive",
            Diagnosis::Normal => "Normal",
            Diagnosis::ViralPneumonia => "Viral Pneumonia",
        }
    }

    /// Labels in model output order.
    pub fn labels() -> [&'static str; NUM_CLASSES] {
        Self::ALL.map(Diagnosis::label)
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Diagnosis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

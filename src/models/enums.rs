use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(CodeSystem {
    Icd => "icd",
    Cpt => "cpt",
});

str_enum!(MatchSource {
    ExplicitCode => "explicit_code",
    NlpRetrieval => "nlp_retrieval",
    ExternalModel => "external_model",
});

impl CodeSystem {
    /// Both catalog-backed systems, in build order.
    pub const ALL: [CodeSystem; 2] = [CodeSystem::Icd, CodeSystem::Cpt];
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn code_system_round_trips_through_str() {
        for system in CodeSystem::ALL {
            assert_eq!(CodeSystem::from_str(system.as_str()).unwrap(), system);
        }
    }

    #[test]
    fn unknown_code_system_is_invalid_enum() {
        let err = CodeSystem::from_str("snomed").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn match_source_serializes_snake_case() {
        let json = serde_json::to_string(&MatchSource::ExplicitCode).unwrap();
        assert_eq!(json, "\"explicit_code\"");
        let json = serde_json::to_string(&MatchSource::NlpRetrieval).unwrap();
        assert_eq!(json, "\"nlp_retrieval\"");
    }
}

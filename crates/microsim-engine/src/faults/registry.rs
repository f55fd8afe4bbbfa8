use crate::FaultError;
use crate::faults::{SharedFault, SharedFaultKind};
use crate::route::FaultSpec;
use std::collections::BTreeMap;

#[derive(Clone, Default)]
pub struct FaultRegistry {
    kinds: BTreeMap<String, SharedFaultKind>,
}

impl FaultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_kind(
        &mut self,
        kind: impl Into<String>,
        decoder: SharedFaultKind,
    ) -> Option<SharedFaultKind> {
        self.kinds.insert(kind.into(), decoder)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    pub fn decode(&self, spec: &FaultSpec) -> Result<SharedFault, FaultError> {
        if spec.kind.is_empty() {
            return Err(FaultError::Undefined);
        }
        let decoder = self
            .kinds
            .get(&spec.kind)
            .ok_or_else(|| FaultError::NotImplemented(spec.kind.clone()))?;
        decoder.decode(&spec.args)
    }

    pub fn decode_all(&self, specs: &[FaultSpec]) -> Result<Vec<SharedFault>, FaultError> {
        specs.iter().map(|spec| self.decode(spec)).collect()
    }
}

impl std::fmt::Debug for FaultRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultRegistry")
            .field("kinds", &self.kinds.keys().collect::<Vec<_>>())
            .finish()
    }
}

use crate::SimError;
use crate::topology::ServiceTopology;

/// Designations starting with this are already network addresses.
pub const ADDRESS_SCHEME_PREFIX: &str = "http";

pub fn is_address(designation: &str) -> bool {
    designation.starts_with(ADDRESS_SCHEME_PREFIX)
}

pub fn try_resolve(name: &str, topology: &ServiceTopology) -> Result<String, SimError> {
    if is_address(name) {
        return Ok(name.to_string());
    }
    topology
        .lookup(name)
        .map(str::to_string)
        .ok_or_else(|| SimError::ResolutionMiss(name.to_string()))
}

/// Maps a symbolic service name to its endpoint. A miss is logged and the
/// name is returned unchanged; one bad branch must not abort a round.
pub fn resolve(name: &str, topology: &ServiceTopology) -> String {
    match try_resolve(name, topology) {
        Ok(address) => address,
        Err(error) => {
            tracing::warn!(
                designation = name,
                lookup_key = %topology.lookup_key(name),
                topology_id = %topology.topology_id,
                %error,
                "leaving designation unresolved"
            );
            name.to_string()
        }
    }
}

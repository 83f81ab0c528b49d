//! FinFools Core: entity time-series database, matching, load filters and
//! derived-series operators.
//!
//! This crate contains the in-memory analytics engine:
//! - ETSDB: dense `entity × trading-day` matrices per data key, with date,
//!   entity and type registries, aliases and hole-fill
//! - Token/regex matching engine for type and entity-name templates
//! - Named load filters applied at ingestion
//! - Operator pipeline (`srel`, `rel`, `reton`, moving averages, `roll`,
//!   `block`, `rsi`, `pivot`) writing derived keys with metadata
//! - Session images: bit-exact save/restore of the whole database

pub mod edb;
pub mod error;
pub mod filter;
pub mod matcher;
pub mod ops;

pub use edb::{date_to_ymd, ymd_to_date, DerivedMeta, Edb, Entity};
pub use error::{EdbError, OpError, SessionError};
pub use filter::{CompiledFilter, FilterRegistry, LoadFilter, NO_FILTER};
pub use matcher::{MatchKind, Matcher, Matches};
pub use ops::{apply, parse_op, run_ops, OpRequest, OpSpec};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the database and its parts can move to a worker
    /// thread and be shared read-only.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Edb>();
        require_sync::<Edb>();
        require_send::<DerivedMeta>();
        require_sync::<DerivedMeta>();
        require_send::<Matcher>();
        require_sync::<Matcher>();
        require_send::<FilterRegistry>();
        require_sync::<FilterRegistry>();
        require_send::<OpRequest>();
        require_sync::<OpRequest>();
        require_send::<ops::OpOutput>();
        require_sync::<ops::OpOutput>();
    }

    #[test]
    fn op_string_round_trip_through_store() {
        let mut edb = Edb::new(1, 2, &["data"]).unwrap();
        let t = edb.add_type("index");
        edb.add_date(ymd_to_date(20200101).unwrap()).unwrap();
        edb.add_data("N", &[("data", 100.0)], Some("Nifty"), Some(t))
            .unwrap();
        edb.add_date(ymd_to_date(20200102).unwrap()).unwrap();
        edb.add_data("N", &[("data", 110.0)], None, None).unwrap();
        edb.optimise_size();

        let results = run_ops(&mut edb, &["gain = srel(data)"]);
        assert_eq!(results[0].as_ref().unwrap(), "gain");
        ops::assert_row(edb.data("gain").unwrap().row(0), &[0.0, 10.0]);
    }
}

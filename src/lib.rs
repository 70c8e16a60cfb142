#![forbid(unsafe_code)]
//! tandem: lazy tabular queries over two backends.
//!
//! Frames are built lazily as a node graph. On `compute`, each node runs
//! either in the in-memory table engine or inside an embedded SQLite
//! database, picked per node by the session's offload strategy.
//!
//! ```no_run
//! use tandem::prelude::*;
//!
//! let session = Session::new(EngineConfig::default().with_strategy(OffloadStrategy::Best))?;
//! let a = session.from_rows(&["c0", "c1"], vec![vec![Scalar::I64(1), Scalar::I64(10)]])?;
//! let b = session.from_rows(&["c0", "c1"], vec![vec![Scalar::I64(1), Scalar::I64(100)]])?;
//! let joined = a.merge(&b, &["c0"], JoinType::Inner)?;
//! println!("{:?}", joined.to_table()?);
//! # Ok::<(), tandem::ExecError>(())
//! ```

pub use tandem_core as core;
pub use tandem_exec as exec;
pub use tandem_frame as frame;
pub use tandem_graph as graph;
pub use tandem_mem as mem;
pub use tandem_sql as sql;
pub use tandem_store as store;

pub use tandem_exec::{DataFrame, ExecError, GroupBy, Operand, Result, Session};

pub mod prelude {
    pub use tandem_core::prelude::*;
    pub use tandem_exec::{CostModel, DataFrame, DefaultCostModel, ExecError, GroupBy, Operand, Session};
    pub use tandem_frame::Value;
    pub use tandem_store::StoreStats;
}

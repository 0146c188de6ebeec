pub mod aig;
pub mod certificate;
pub mod oracle;
pub mod rewrite;

// Re-exporting symbols and modules.
pub use aig::dfs;
pub use aig::{Aig, AigEdge, AigError, AigNode, Birth, FaninId, Level, NodeId, NodeKind, ParserError, Result};
pub use certificate::{Certificate, CertificateError, CertificateTrail, StableId};
pub use oracle::{CutOracle, DarOracle};
pub use rewrite::{RewriteError, RewriteParams, RewriteStats, Rewriter, rewrite, rewrite_certified};

//! Certificates of equivalence emitted by the rewriting passes.
//!
//! A [`Certificate`] lists, in causal order, every structural edit one certified pass applied
//! to an [`Aig`](crate::Aig), named with [`StableId`]s rather than slots (slots get recycled,
//! stable ids never do). A [`CertificateTrail`] collects the certificates of successive passes.
//!
//! The binary layout (see [`CertificateTrail::write_to`]) only uses little-endian `i32`:
//!
//! ```text
//! CertificateTrail := count, Certificate{count}
//! Certificate      := mutation count, Mutation{..}, hint count, Hint{..}
//! Mutation         := tag, a, b, c, d, e
//!     tag 0 Replace : old_id, new_id, complement, 0, 0
//!     tag 1 Create  : id, fanin0_id, fanin0_compl, fanin1_id, fanin1_compl
//! Hint             := id, id_eq, compl_eq
//! ```

pub mod identity;
pub mod recorder;
pub mod replay;
mod wire;

use std::fmt;

use thiserror::Error;

use crate::AigError;

pub use identity::IdentityManager;
pub use recorder::{CertifSession, CertificateRecorder};
pub use replay::Replay;

/// The result of a certificate operation.
pub type Result<T> = std::result::Result<T, CertificateError>;

/// Logical identity of a node, never reused during an optimization run.
///
/// Only ids up to `i32::MAX` can be written in a certificate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StableId(u32);

impl StableId {
    /// The constant false node.
    pub const CONST0: StableId = StableId(0);
    /// Designated identity of constant true. Never handed out by an [`IdentityManager`].
    pub const CONST1: StableId = StableId(i32::MAX as u32);
    /// Sentinel returned when ids are not tracked. Never written into a certificate.
    pub const UNTRACKED: StableId = StableId(u32::MAX);

    pub const fn new(id: u32) -> Self {
        StableId(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub fn is_const(self) -> bool {
        self == StableId::CONST0 || self == StableId::CONST1
    }

    /// Whether the id fits in the wire format.
    pub fn is_writable(self) -> bool {
        self.0 <= i32::MAX as u32
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == StableId::UNTRACKED {
            write!(f, "untracked")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A literal named by stable id: the node and whether it is inverted.
pub type StableLit = (StableId, bool);

/// One structural edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// `old_id` is henceforth defined as `new_id`, inverted iff `complement`.
    Replace {
        old_id: StableId,
        new_id: StableId,
        complement: bool,
    },
    /// A new and gate `id = fanin0 & fanin1`.
    Create {
        id: StableId,
        fanin0: StableLit,
        fanin1: StableLit,
    },
}

/// Explicit equivalence fact: `id` equals `id_eq`, inverted iff `compl_eq`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hint {
    pub id: StableId,
    pub id_eq: StableId,
    pub compl_eq: bool,
}

/// Everything one certified pass did. Immutable once built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Certificate {
    mutations: Vec<Mutation>,
    hints: Vec<Hint>,
}

impl Certificate {
    pub(crate) fn new(mutations: Vec<Mutation>, hints: Vec<Hint>) -> Self {
        Certificate { mutations, hints }
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn hints(&self) -> &[Hint] {
        &self.hints
    }

    /// True if the pass did not edit anything.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty() && self.hints.is_empty()
    }
}

/// Certificates of successive passes, in invocation order. Append-only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CertificateTrail {
    certificates: Vec<Certificate>,
}

impl CertificateTrail {
    pub fn new() -> Self {
        CertificateTrail::default()
    }

    pub(crate) fn push(&mut self, certificate: Certificate) {
        self.certificates.push(certificate);
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Certificate> {
        self.certificates.get(index)
    }

    pub fn last(&self) -> Option<&Certificate> {
        self.certificates.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Certificate> {
        self.certificates.iter()
    }
}

impl<'a> IntoIterator for &'a CertificateTrail {
    type Item = &'a Certificate;
    type IntoIter = std::slice::Iter<'a, Certificate>;

    fn into_iter(self) -> Self::IntoIter {
        self.certificates.iter()
    }
}

/// Error returned when recording, serializing or replaying certificates failed.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// The identity manager would hand out [`StableId::CONST1`] or beyond.
    #[error("stable id counter overflow")]
    IdOverflow,

    /// A recording call was made while no pass is open.
    #[error("no certificate pass is open")]
    NoOpenPass,

    /// `begin_pass` was called twice without finalizing the first pass.
    #[error("a certificate pass is already open")]
    PassAlreadyOpen,

    /// The id cannot be written in a certificate.
    #[error("stable id {0} cannot be recorded")]
    IdOutOfRange(StableId),

    /// A mutation references an id that is not defined yet.
    #[error("stable id {0} is not defined")]
    UnknownId(StableId),

    /// A `Create` redefines an existing id.
    #[error("stable id {0} is already defined")]
    DuplicateId(StableId),

    /// Replacements made an id depend on itself.
    #[error("stable id {0} depends on itself")]
    Cycle(StableId),

    /// A hint does not match any replacement of its certificate.
    #[error("hint {0} does not match any replacement")]
    HintMismatch(usize),

    /// The bytes are not a valid certificate trail.
    #[error("invalid certificate trail: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Just forwarding an [`AigError`] (replay against a graph).
    #[error("{0}")]
    Aig(#[from] AigError),
}

use log::trace;

use super::{
    Certificate, CertificateError, CertificateTrail, Hint, IdentityManager, Mutation, Result,
    StableId, StableLit,
};

/// Sequences accumulated by the open pass.
#[derive(Debug, Default)]
struct OpenPass {
    mutations: Vec<Mutation>,
    hints: Vec<Hint>,
}

/// Accumulates the mutations and hints of one pass, then packages them into a [`Certificate`].
///
/// ```rust
/// use certaig::certificate::{CertificateRecorder, CertificateTrail, StableId};
/// let mut trail = CertificateTrail::new();
/// let mut recorder = CertificateRecorder::new();
/// recorder.begin_pass().unwrap();
/// recorder
///     .record_replace(StableId::new(4), StableId::CONST0, false)
///     .unwrap();
/// recorder.finalize_pass(&mut trail).unwrap();
/// assert_eq!(trail.len(), 1);
/// assert!(recorder.finalize_pass(&mut trail).is_err());
/// ```
#[derive(Debug, Default)]
pub struct CertificateRecorder {
    open: Option<OpenPass>,
}

fn writable(id: StableId) -> Result<StableId> {
    if id.is_writable() {
        Ok(id)
    } else {
        Err(CertificateError::IdOutOfRange(id))
    }
}

impl CertificateRecorder {
    pub fn new() -> Self {
        CertificateRecorder::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn begin_pass(&mut self) -> Result<()> {
        if self.open.is_some() {
            return Err(CertificateError::PassAlreadyOpen);
        }
        self.open = Some(OpenPass::default());
        Ok(())
    }

    fn open_pass(&mut self) -> Result<&mut OpenPass> {
        self.open.as_mut().ok_or(CertificateError::NoOpenPass)
    }

    pub fn record_replace(&mut self, old_id: StableId, new_id: StableId, complement: bool) -> Result<()> {
        let mutation = Mutation::Replace {
            old_id: writable(old_id)?,
            new_id: writable(new_id)?,
            complement,
        };
        trace!("{:?}", mutation);
        self.open_pass()?.mutations.push(mutation);
        Ok(())
    }

    pub fn record_create(&mut self, id: StableId, fanin0: StableLit, fanin1: StableLit) -> Result<()> {
        let mutation = Mutation::Create {
            id: writable(id)?,
            fanin0: (writable(fanin0.0)?, fanin0.1),
            fanin1: (writable(fanin1.0)?, fanin1.1),
        };
        trace!("{:?}", mutation);
        self.open_pass()?.mutations.push(mutation);
        Ok(())
    }

    pub fn record_hint(&mut self, id: StableId, id_eq: StableId, compl_eq: bool) -> Result<()> {
        let hint = Hint {
            id: writable(id)?,
            id_eq: writable(id_eq)?,
            compl_eq,
        };
        trace!("{:?}", hint);
        self.open_pass()?.hints.push(hint);
        Ok(())
    }

    /// Packages the open pass into a certificate and appends it to `trail`.
    pub fn finalize_pass(&mut self, trail: &mut CertificateTrail) -> Result<()> {
        let open = self.open.take().ok_or(CertificateError::NoOpenPass)?;
        trail.push(Certificate::new(open.mutations, open.hints));
        Ok(())
    }

    /// Drops the open pass, if any, without producing a certificate.
    pub fn discard_pass(&mut self) {
        self.open = None;
    }
}

/// How a pass deals with identities and certificates.
///
/// Rewriting code is written once against this type: in untracked mode every recording call is
/// a no-op and fresh ids are [`StableId::UNTRACKED`] (the graph then picks ids of its own).
#[derive(Debug)]
pub enum CertifSession {
    Untracked,
    Tracked {
        ids: IdentityManager,
        recorder: CertificateRecorder,
    },
}

impl CertifSession {
    pub fn untracked() -> Self {
        CertifSession::Untracked
    }

    /// A tracked session with an open pass, handing out ids above `initial_node_count`.
    pub fn tracked(initial_node_count: u32) -> Result<Self> {
        let mut recorder = CertificateRecorder::new();
        recorder.begin_pass()?;
        Ok(CertifSession::Tracked {
            ids: IdentityManager::new(initial_node_count),
            recorder,
        })
    }

    pub fn is_tracked(&self) -> bool {
        matches!(self, CertifSession::Tracked { .. })
    }

    pub fn fresh_id(&mut self) -> Result<StableId> {
        match self {
            CertifSession::Untracked => Ok(StableId::UNTRACKED),
            CertifSession::Tracked { ids, .. } => ids.fresh_id(),
        }
    }

    pub fn record_replace(&mut self, old_id: StableId, new_id: StableId, complement: bool) -> Result<()> {
        match self {
            CertifSession::Untracked => Ok(()),
            CertifSession::Tracked { recorder, .. } => recorder.record_replace(old_id, new_id, complement),
        }
    }

    pub fn record_create(&mut self, id: StableId, fanin0: StableLit, fanin1: StableLit) -> Result<()> {
        match self {
            CertifSession::Untracked => Ok(()),
            CertifSession::Tracked { recorder, .. } => recorder.record_create(id, fanin0, fanin1),
        }
    }

    pub fn record_hint(&mut self, id: StableId, id_eq: StableId, compl_eq: bool) -> Result<()> {
        match self {
            CertifSession::Untracked => Ok(()),
            CertifSession::Tracked { recorder, .. } => recorder.record_hint(id, id_eq, compl_eq),
        }
    }

    /// Closes the pass: the certificate is appended to `trail` in tracked mode.
    pub fn finalize(&mut self, trail: &mut CertificateTrail) -> Result<()> {
        match self {
            CertifSession::Untracked => Ok(()),
            CertifSession::Tracked { recorder, .. } => recorder.finalize_pass(trail),
        }
    }
}

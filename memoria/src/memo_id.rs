use std::{
    fmt,
    num::NonZeroU64,
    panic::Location,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_MEMO_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a memoizer instance.
///
/// Every memoizer (including the one inside each memoized selector) gets a fresh ID, so the log
/// events of two independent caches created at the same call site can be told apart.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct MemoId(NonZeroU64);

impl MemoId {
    fn next() -> MemoId {
        let id = NEXT_MEMO_ID.fetch_add(1, Ordering::Relaxed);
        MemoId(NonZeroU64::new(id).expect("memoizer ID counter wrapped around"))
    }

    pub fn to_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for MemoId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("MemoId").field(&format_args!("{:04X}", self.0)).finish()
    }
}

/// Identity of a memoizer: its ID, an optional name, and where it was created.
#[derive(Clone)]
pub struct MemoInfo {
    id: MemoId,
    name: Option<String>,
    location: &'static Location<'static>,
}

impl MemoInfo {
    #[track_caller]
    pub(crate) fn new(name: Option<String>) -> MemoInfo {
        MemoInfo {
            id: MemoId::next(),
            name,
            location: Location::caller(),
        }
    }

    pub fn id(&self) -> MemoId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Source location of the `Memoizer::new`/`create_selector` call that created the memoizer.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

impl fmt::Debug for MemoInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "MemoInfo({:04X})", self.id.0)?;
            if let Some(name) = &self.name {
                writeln!(f, "\t name: {name}")?;
            }
            writeln!(f, "\t --> {}", self.location)
        } else {
            f.debug_tuple("MemoInfo").field(&format_args!("{}", self)).finish()
        }
    }
}

impl fmt::Display for MemoInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}#{}", self.id.0),
            None => write!(f, "{}#{}", self.location, self.id.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_per_instance() {
        let infos: Vec<_> = (0..4).map(|_| MemoInfo::new(None)).collect();
        for (i, a) in infos.iter().enumerate() {
            for b in &infos[i + 1..] {
                assert_ne!(a.id(), b.id());
                // same call site
                assert_eq!(a.location(), b.location());
            }
        }
    }

    #[test]
    fn display_prefers_name() {
        let info = MemoInfo::new(Some("filtered_users".to_string()));
        assert!(info.to_string().starts_with("filtered_users#"));
        let info = MemoInfo::new(None);
        assert!(info.to_string().contains("memo_id.rs"));
    }
}

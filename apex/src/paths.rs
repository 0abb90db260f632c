use std::path::PathBuf;

/// Filesystem layout of an Apex deployment.
///
/// The root is taken from the `APEX_HOME` environment variable, defaulting to
/// `<home>/apex`. Everything else hangs off it:
/// `data/refdata` for reference data, `data/tickdata` for recorded ticks, `persist` for
/// position recovery records, `log` for audit output.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PathsConfig {
    pub root: PathBuf,
    pub refdata: PathBuf,
    pub tickdata: PathBuf,
    pub persist: PathBuf,
    pub log: PathBuf,
}

impl PathsConfig {
    /// Resolve the layout from the environment.
    pub fn resolve() -> Self {
        let root = std::env::var("APEX_HOME").map(PathBuf::from).unwrap_or_else(|_| {
            let home = std::env::var("HOME").map(PathBuf::from).unwrap_or_default();
            home.join("apex")
        });
        Self::under_root(root)
    }

    /// Resolve the layout under an explicit root, eg/ a test directory.
    pub fn under_root(root: PathBuf) -> Self {
        Self {
            refdata: root.join("data").join("refdata"),
            tickdata: root.join("data").join("tickdata"),
            persist: root.join("persist"),
            log: root.join("log"),
            root,
        }
    }

    pub fn instruments_csv(&self) -> PathBuf {
        self.refdata.join("instruments").join("instruments.csv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_root() {
        let paths = PathsConfig::under_root(PathBuf::from("/tmp/apex-root"));
        assert_eq!(
            paths.instruments_csv(),
            PathBuf::from("/tmp/apex-root/data/refdata/instruments/instruments.csv")
        );
        assert_eq!(paths.tickdata, PathBuf::from("/tmp/apex-root/data/tickdata"));
        assert_eq!(paths.persist, PathBuf::from("/tmp/apex-root/persist"));
        assert_eq!(paths.log, PathBuf::from("/tmp/apex-root/log"));
    }
}

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tempfile::TempDir;

/// Validates like a correct solution, then prints the marker lines each
/// catalog scenario expects.
pub const CONFORMING: &str = r#"#!/bin/sh
if [ $# -lt 4 ] || [ $# -gt 5 ]; then
    echo "Error: wrong number of arguments" >&2
    exit 1
fi
for arg in "$@"; do
    case "$arg" in
        ''|*[!0-9]*) echo "Error: invalid argument '$arg'" >&2; exit 1 ;;
    esac
done
n=$1
if [ ${#n} -gt 3 ] || [ "$n" -lt 1 ]; then
    echo "Error: invalid number of philosophers" >&2
    exit 1
fi
if [ $# -eq 5 ]; then
    if [ "$5" -lt 1 ]; then
        echo "Error: invalid number of meals" >&2
        exit 1
    fi
    i=0
    total=$((n * $5))
    while [ $i -lt $total ]; do
        id=$((i % n + 1))
        echo "$i $id has taken a fork"
        echo "$i $id is eating"
        echo "$i $id is sleeping"
        echo "$i $id is thinking"
        i=$((i + 1))
    done
    exit 0
fi
if [ "$n" -eq 1 ]; then
    echo "0 1 has taken a fork"
    echo "$2 1 died"
    exit 0
fi
id=1
while [ $id -le "$n" ]; do
    echo "0 $id is eating"
    echo "$3 $id is sleeping"
    id=$((id + 1))
done
echo "$2 1 died"
exit 0
"#;

/// Exits 0 without printing anything, whatever the arguments.
pub const ALWAYS_ACCEPTS: &str = "#!/bin/sh\nexit 0\n";

/// Never finishes on its own.
pub const HANGS: &str = "#!/bin/sh\necho \"0 1 is thinking\"\nsleep 30\n";

/// Dies from SIGSEGV on every invocation.
pub const SEGFAULTS: &str = "#!/bin/sh\nkill -SEGV $$\n";

/// A throwaway project directory holding an executable `philo` script.
pub struct FakePhilo {
    pub dir: TempDir,
    pub binary: PathBuf,
}

impl FakePhilo {
    pub fn new(script: &str) -> Self {
        crate::test_log!("FIXTURE: Creating fake philo binary");

        let dir = TempDir::new().expect("Failed to create temp dir");
        let binary = dir.path().join("philo");
        fs::write(&binary, script).expect("Failed to write fake philo");
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod fake philo");

        Self { dir, binary }
    }

    /// Add an extra executable script next to the binary.
    pub fn with_script(self, name: &str, script: &str) -> Self {
        let path = self.dir.path().join(name);
        fs::write(&path, script).expect("Failed to write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod script");
        self
    }

    pub fn script_path(&self, name: &str) -> String {
        self.dir.path().join(name).to_string_lossy().into_owned()
    }
}

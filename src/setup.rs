//! First-run setup: migrate the legacy layout, materialize the base
//! profile, build the base image, and mark setup complete.

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::cancel::CancelToken;
use crate::config::State;
use crate::migrate;
use crate::paths::Paths;
use crate::resources;
use crate::runtime::Runtime;

pub fn run(paths: &Paths, runtime: &dyn Runtime, cancel: &CancelToken, force: bool) -> Result<()> {
    cancel.check()?;
    if migrate::migrate_if_needed(paths)? {
        println!("Migrated legacy layout to {}", paths.profiles_dir().display());
    }

    let notes = resources::materialize_base_profile(paths)?;
    for note in &notes {
        println!("{note}");
    }

    build_base_image(paths, runtime, cancel, force)?;

    let mut state = State::load(&paths.state_file())?;
    if !state.setup_complete {
        state.setup_complete = true;
        state.save(&paths.state_file())?;
    }
    println!("Setup complete. Root: {}", paths.root().display());
    Ok(())
}

/// Build `taskbox-base` unless the Dockerfile is unchanged since the
/// last successful build and the image still exists.
fn build_base_image(
    paths: &Paths,
    runtime: &dyn Runtime,
    cancel: &CancelToken,
    force: bool,
) -> Result<()> {
    let base_dir = paths.profile_dir("base");
    let dockerfile = fs::read(base_dir.join("Dockerfile"))
        .with_context(|| format!("missing Dockerfile in {}", base_dir.display()))?;
    let current = resources::sha256_hex(&dockerfile);

    let marker = base_dir.join(resources::LAST_BUILD_CHECKSUM);
    let last = fs::read_to_string(&marker).unwrap_or_default();
    let image_present = runtime.image_exists(cancel, "taskbox-base")?;

    if !force && image_present && last.trim() == current {
        info!("setup:base image up to date");
        return Ok(());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}").expect("spinner template"));
    spinner.set_message("Building base image taskbox-base...");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = runtime.ensure_image(cancel, &base_dir, "taskbox-base", force || image_present);
    spinner.finish_and_clear();
    result.context("base image build failed")?;

    fs::write(&marker, &current)?;
    println!("Built image taskbox-base");
    Ok(())
}

/// Build the image for an image-bearing profile, when the runtime
/// supports it. Backends without the capability silently skip.
pub fn build_profile_image(
    paths: &Paths,
    runtime: &dyn Runtime,
    cancel: &CancelToken,
    profile: &str,
    force: bool,
) -> Result<()> {
    let profile_dir = paths.profile_dir(profile);
    if !profile_dir.join("Dockerfile").exists() {
        return Ok(());
    }
    let Some(builder) = runtime.as_image_builder() else {
        info!(profile, "setup:runtime cannot build profile images, skipping");
        return Ok(());
    };
    builder.build_profile_image(cancel, &profile_dir, &format!("taskbox-{profile}"), force)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    use crate::runtime::{ExecResult, InstanceConfig, InstanceInfo};

    /// Minimal runtime stub recording image operations.
    #[derive(Default)]
    struct StubRuntime {
        image_exists: bool,
        builds: Mutex<Vec<String>>,
    }

    impl Runtime for StubRuntime {
        fn ensure_image(
            &self,
            _cancel: &CancelToken,
            _source_dir: &Path,
            tag: &str,
            _force: bool,
        ) -> Result<()> {
            self.builds.lock().unwrap().push(tag.to_string());
            Ok(())
        }
        fn image_exists(&self, _cancel: &CancelToken, _tag: &str) -> Result<bool> {
            Ok(self.image_exists)
        }
        fn create(&self, _c: &CancelToken, _cfg: &InstanceConfig) -> Result<()> {
            unimplemented!()
        }
        fn start(&self, _c: &CancelToken, _n: &str) -> Result<()> {
            unimplemented!()
        }
        fn stop(&self, _c: &CancelToken, _n: &str) -> Result<()> {
            unimplemented!()
        }
        fn remove(&self, _c: &CancelToken, _n: &str) -> Result<()> {
            unimplemented!()
        }
        fn inspect(&self, _c: &CancelToken, _n: &str) -> Result<InstanceInfo> {
            unimplemented!()
        }
        fn exec(&self, _c: &CancelToken, _n: &str, _cmd: &[&str], _u: &str) -> Result<ExecResult> {
            unimplemented!()
        }
        fn interactive_exec(
            &self,
            _c: &CancelToken,
            _n: &str,
            _cmd: &[&str],
            _u: &str,
        ) -> Result<()> {
            unimplemented!()
        }
        fn diag_hint(&self, _n: &str) -> String {
            String::new()
        }
    }

    #[test]
    fn setup_builds_image_and_marks_state() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::at(dir.path());
        let runtime = StubRuntime::default();

        run(&paths, &runtime, &CancelToken::new(), false).unwrap();

        assert_eq!(*runtime.builds.lock().unwrap(), vec!["taskbox-base"]);
        assert!(State::load(&paths.state_file()).unwrap().setup_complete);
        assert!(
            paths
                .profile_dir("base")
                .join(resources::LAST_BUILD_CHECKSUM)
                .exists()
        );
    }

    #[test]
    fn unchanged_dockerfile_skips_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::at(dir.path());
        let runtime = StubRuntime {
            image_exists: true,
            ..Default::default()
        };

        run(&paths, &runtime, &CancelToken::new(), false).unwrap();
        run(&paths, &runtime, &CancelToken::new(), false).unwrap();
        assert_eq!(runtime.builds.lock().unwrap().len(), 1);
    }

    #[test]
    fn force_always_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::at(dir.path());
        let runtime = StubRuntime {
            image_exists: true,
            ..Default::default()
        };

        run(&paths, &runtime, &CancelToken::new(), true).unwrap();
        run(&paths, &runtime, &CancelToken::new(), true).unwrap();
        assert_eq!(runtime.builds.lock().unwrap().len(), 2);
    }

    #[test]
    fn profile_image_skipped_without_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::at(dir.path());
        let runtime = StubRuntime::default();
        build_profile_image(&paths, &runtime, &CancelToken::new(), "web", false).unwrap();
        assert!(runtime.builds.lock().unwrap().is_empty());
    }
}

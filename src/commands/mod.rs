pub mod lifecycle;
pub mod status;

use std::fs;

use anyhow::{Context as _, Result, bail};
use reconcile::SnapshotOptions;

use crate::AppContext;
use crate::detect;
use crate::overlay::Overlay;
use crate::paths;
use crate::settings::Settings;

/// Everything a command needs about the project it runs against
pub struct Project {
    pub overlay: Overlay,
    pub settings: Settings,
    pub ctx: reconcile::Context,
}

impl Project {
    pub fn open(app: &AppContext) -> Result<Self> {
        let root = fs::canonicalize(&app.root)
            .with_context(|| format!("Project directory {} not found", app.root.display()))?;
        if !root.is_dir() {
            bail!("{} is not a directory", root.display());
        }

        let settings = Settings::load()?;
        let configured = settings.overlay(&paths::config_dir()?);
        let overlay = match app.overlay.clone().or(configured) {
            Some(path) => Overlay::load(&path)?,
            None => Overlay::bundled()?,
        };
        log::debug!("Using overlay {}", overlay.origin);

        let capabilities = detect::capabilities(
            &root,
            overlay.schema.manifest.as_deref(),
            &overlay.capabilities,
        );
        let mut vars = overlay.vars.clone();
        vars.extend(settings.vars.clone());

        let opts = SnapshotOptions {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities,
            vars,
        };
        let ctx = reconcile::Context::snapshot(&root, &overlay.schema, opts)
            .with_context(|| format!("Could not read project {}", root.display()))?;

        Ok(Self {
            overlay,
            settings,
            ctx,
        })
    }
}

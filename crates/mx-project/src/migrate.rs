//! Schema migration framework.

use crate::ProjectError;
use crate::schema::ProjectFile;

pub const LATEST_VERSION: u32 = 1;

pub fn migrate_to_latest(mut project: ProjectFile) -> Result<ProjectFile, ProjectError> {
    while project.version < LATEST_VERSION {
        project = migrate_one_version(project)?;
    }
    Ok(project)
}

fn migrate_one_version(project: ProjectFile) -> Result<ProjectFile, ProjectError> {
    match project.version {
        0 => migrate_v0_to_v1(project),
        v => Err(ProjectError::Migration {
            what: format!("No migration path from version {}", v),
        }),
    }
}

/// Unversioned files used `stages` for SBS problems too, where it has no
/// effect; drop it so a later switch to SWS does not pick it up silently.
fn migrate_v0_to_v1(mut project: ProjectFile) -> Result<ProjectFile, ProjectError> {
    if project.hybrid.superstruct == mx_core::Superstructure::StageBased {
        project.hybrid.stages = None;
    }
    project.version = 1;
    Ok(project)
}

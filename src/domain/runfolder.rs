use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::AppError;

type Result<T> = std::result::Result<T, AppError>;

/// A project directory inside a runfolder, or a standalone project directory.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runfolder_path: Option<String>,
}

/// A directory produced by a sequencing instrument run.
#[derive(Debug, Clone, Serialize)]
pub struct Runfolder {
    pub name: String,
    pub path: String,
    pub projects: Vec<Project>,
}

const PROJECTS_SUBDIR: &str = "Projects";

/// Read-only discovery of runfolders under the monitored directory.
#[derive(Debug)]
pub struct FileSystemRunfolderRepository {
    monitored_dir: PathBuf,
}

impl FileSystemRunfolderRepository {
    pub fn new(monitored_dir: impl Into<PathBuf>) -> Self {
        Self {
            monitored_dir: monitored_dir.into(),
        }
    }

    pub async fn get_runfolders(&self) -> Result<Vec<Runfolder>> {
        let mut runfolders = Vec::new();
        for path in list_directories(&self.monitored_dir).await? {
            runfolders.push(self.load_runfolder(&path).await?);
        }
        runfolders.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(runfolders)
    }

    pub async fn runfolder_by_name(&self, name: &str) -> Result<Runfolder> {
        let path = self.monitored_dir.join(name);
        if !tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(AppError::NotFound(format!("runfolder {name}")));
        }
        self.load_runfolder(&path).await
    }

    async fn load_runfolder(&self, path: &Path) -> Result<Runfolder> {
        let name = dir_name(path);
        let mut projects = Vec::new();
        let projects_dir = path.join(PROJECTS_SUBDIR);
        if tokio::fs::metadata(&projects_dir).await.is_ok() {
            for project_path in list_directories(&projects_dir).await? {
                projects.push(Project {
                    name: dir_name(&project_path),
                    path: project_path.to_string_lossy().into_owned(),
                    runfolder_path: Some(path.to_string_lossy().into_owned()),
                });
            }
        }
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Runfolder {
            name,
            path: path.to_string_lossy().into_owned(),
            projects,
        })
    }
}

/// Read-only discovery of standalone project directories.
#[derive(Debug)]
pub struct GeneralProjectRepository {
    projects_dir: PathBuf,
}

impl GeneralProjectRepository {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
        }
    }

    pub async fn get_projects(&self) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        for path in list_directories(&self.projects_dir).await? {
            projects.push(Project {
                name: dir_name(&path),
                path: path.to_string_lossy().into_owned(),
                runfolder_path: None,
            });
        }
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    pub async fn project_by_name(&self, name: &str) -> Result<Project> {
        let path = self.projects_dir.join(name);
        if !tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(AppError::NotFound(format!("project {name}")));
        }
        Ok(Project {
            name: name.to_string(),
            path: path.to_string_lossy().into_owned(),
            runfolder_path: None,
        })
    }
}

async fn list_directories(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            paths.push(entry.path());
        }
    }
    Ok(paths)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_runfolder(root: &Path, runfolder: &str, projects: &[&str]) {
        for project in projects {
            std::fs::create_dir_all(root.join(runfolder).join(PROJECTS_SUBDIR).join(project))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn lists_runfolders_with_their_projects() {
        let dir = tempfile::tempdir().unwrap();
        fixture_runfolder(dir.path(), "160930_ST-E00216_0111_BH37CWALXX", &["ABC_123"]);
        fixture_runfolder(dir.path(), "160930_ST-E00216_0112_AH37CWALXX", &["ABC_123", "DEF_456"]);

        let repo = FileSystemRunfolderRepository::new(dir.path());
        let runfolders = repo.get_runfolders().await.unwrap();
        assert_eq!(runfolders.len(), 2);
        assert_eq!(runfolders[0].name, "160930_ST-E00216_0111_BH37CWALXX");
        assert_eq!(runfolders[0].projects.len(), 1);
        assert_eq!(runfolders[0].projects[0].name, "ABC_123");
        assert_eq!(
            runfolders[0].projects[0].runfolder_path.as_deref(),
            Some(runfolders[0].path.as_str())
        );
        assert_eq!(runfolders[1].projects.len(), 2);
    }

    #[tokio::test]
    async fn finds_runfolder_by_name_with_its_projects() {
        let dir = tempfile::tempdir().unwrap();
        fixture_runfolder(dir.path(), "160930_ST-E00216_0111_BH37CWALXX", &["ABC_123"]);
        fixture_runfolder(dir.path(), "160930_ST-E00216_0112_AH37CWALXX", &["DEF_456"]);

        let repo = FileSystemRunfolderRepository::new(dir.path());
        let runfolder = repo
            .runfolder_by_name("160930_ST-E00216_0112_AH37CWALXX")
            .await
            .unwrap();
        assert_eq!(runfolder.projects.len(), 1);
        assert_eq!(runfolder.projects[0].name, "DEF_456");
    }

    #[tokio::test]
    async fn unknown_runfolder_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileSystemRunfolderRepository::new(dir.path());
        let missing = repo.runfolder_by_name("does_not_exist").await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn lists_standalone_projects() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("ABC_123")).unwrap();
        std::fs::create_dir_all(dir.path().join("DEF_456")).unwrap();

        let repo = GeneralProjectRepository::new(dir.path());
        let projects = repo.get_projects().await.unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].name, "ABC_123");

        let single = repo.project_by_name("DEF_456").await.unwrap();
        assert!(single.path.ends_with("DEF_456"));
        let missing = repo.project_by_name("GHI_789").await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}

use std::path::PathBuf;

use super::statefile::record;
use super::{now, ClientState, Discard, LoadReport, ProjectId};
use crate::types::{escape_project_url, App, AppVersion, FileInfo, FILE_PRESENT};
use crate::xml::{ParseError, Token, XmlReader};

/// Per-project file that declares locally supplied apps. Its presence puts
/// the project on the anonymous platform.
pub const APP_INFO_FILE_NAME: &str = "app_info.xml";

impl ClientState {
    pub fn project_dir(&self, project: ProjectId) -> Option<PathBuf> {
        let entry = self.project(project)?;
        Some(
            self.files
                .data_dir()
                .join("projects")
                .join(escape_project_url(&entry.project.master_url)),
        )
    }

    pub(crate) fn load_app_info(&mut self, project: ProjectId, report: &mut LoadReport) {
        let Some(dir) = self.project_dir(project) else {
            return;
        };
        let path = dir.join(APP_INFO_FILE_NAME);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
            Err(err) => {
                tracing::warn!("can't read {:#?}: {}", path, err);
                return;
            }
        };

        let url = match self.project_mut(project) {
            Some(entry) => {
                entry.project.anonymous_platform = true;
                entry.project.master_url.clone()
            }
            None => return,
        };
        tracing::info!("found {:#?}; {} uses the anonymous platform", path, url);

        if let Err(err) = self.parse_app_info(project, &contents, &mut report.discarded) {
            tracing::error!("can't parse {:#?}: {}", path, err);
            report.discarded.push(Discard {
                kind: "app_info",
                name: path.display().to_string(),
                project: Some(url),
                reason: err.to_string(),
            });
        }
    }

    fn parse_app_info(
        &mut self,
        project: ProjectId,
        contents: &str,
        discarded: &mut Vec<Discard>,
    ) -> Result<(), ParseError> {
        let mut r = XmlReader::new(contents).log_unparsed(self.config.log_flags.unparsed_xml);
        match r.next()? {
            Some(tok) if tok.matches_start("app_info") => {}
            _ => return Err(ParseError::MissingWrapper("app_info".into())),
        }

        let now = now();
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close { tag: "app_info" } => return Ok(()),
                Token::Open { tag: "app", .. } => {
                    if let Some(app) = record(&mut r, App::parse, "app", discarded)? {
                        let name = app.name.clone();
                        if let Err(err) = self.link_app(project, app) {
                            discarded.extend(self.discard(Some(project), "app", &name, err));
                        }
                    }
                }
                Token::Open {
                    tag: "file_info" | "file",
                    ..
                } => {
                    let Some(mut file) = record(&mut r, FileInfo::parse, "file_info", discarded)?
                    else {
                        continue;
                    };
                    if !file.download_urls.is_empty() {
                        tracing::warn!(
                            "{} in {} declares download URLs; ignoring it",
                            file.name,
                            APP_INFO_FILE_NAME
                        );
                        discarded.push(Discard {
                            kind: "file_info",
                            name: file.name,
                            project: self.project(project).map(|e| e.project.master_url.clone()),
                            reason: format!("download URLs are not allowed in {APP_INFO_FILE_NAME}"),
                        });
                        continue;
                    }

                    file.status = FILE_PRESENT;
                    let name = file.name.clone();
                    match self.link_file_info(project, file, now) {
                        Ok(id) => {
                            if let Some(entry) = self.file_info_mut(id) {
                                entry.from_app_info = true;
                            }
                        }
                        Err(err) => {
                            discarded.extend(self.discard(Some(project), "file_info", &name, err))
                        }
                    }
                }
                Token::Open {
                    tag: "app_version", ..
                } => {
                    if let Some(version) = record(&mut r, AppVersion::parse, "app_version", discarded)? {
                        let name = format!("{} {}", version.app_name, version.version_num);
                        if let Err(err) = self.link_app_version(project, version) {
                            discarded.extend(self.discard(Some(project), "app_version", &name, err));
                        }
                    }
                }
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("app_info"))
    }
}

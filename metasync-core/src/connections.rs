//! Org connection targets: named remote destinations used by multi-target
//! deploys. Stored per project in `.metasync/connections.yaml` (mode 0600).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{io_err, ProjectError};
use crate::project::{write_private_yaml, Project};

/// One remote destination, distinct from the project's primary connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgConnectionTarget {
    pub id: String,
    pub name: String,
    pub instance_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Input for [`add_connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConnection {
    pub name: String,
    pub instance_url: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Partial update for [`update_connection`]; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionUpdate {
    pub name: Option<String>,
    pub instance_url: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConnectionStore {
    #[serde(default)]
    connections: Vec<OrgConnectionTarget>,
}

fn load_store(project: &Project) -> Result<ConnectionStore, ProjectError> {
    let path = project.connections_path();
    if !path.exists() {
        return Ok(ConnectionStore::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|source| ProjectError::Parse { path, source })
}

fn save_store(project: &Project, store: &ConnectionStore) -> Result<(), ProjectError> {
    write_private_yaml(&project.connections_path(), store)
}

/// All stored targets, in insertion order.
pub fn list_connections(project: &Project) -> Result<Vec<OrgConnectionTarget>, ProjectError> {
    Ok(load_store(project)?.connections)
}

/// Look a target up by id or by name.
pub fn find_connection(project: &Project, key: &str) -> Result<OrgConnectionTarget, ProjectError> {
    load_store(project)?
        .connections
        .into_iter()
        .find(|c| c.id == key || c.name == key)
        .ok_or_else(|| ProjectError::UnknownConnection {
            key: key.to_owned(),
        })
}

/// Add a target. Names must be unique within the project.
pub fn add_connection(
    project: &Project,
    new: NewConnection,
) -> Result<OrgConnectionTarget, ProjectError> {
    let mut store = load_store(project)?;
    if store.connections.iter().any(|c| c.name == new.name) {
        return Err(ProjectError::DuplicateConnection { name: new.name });
    }
    let target = OrgConnectionTarget {
        id: Uuid::new_v4().to_string(),
        name: new.name,
        instance_url: new.instance_url,
        access_token: new.access_token,
        refresh_token: new.refresh_token,
    };
    store.connections.push(target.clone());
    save_store(project, &store)?;
    tracing::info!(name = %target.name, id = %target.id, "added org connection");
    Ok(target)
}

/// Update a target identified by id or name.
pub fn update_connection(
    project: &Project,
    key: &str,
    update: ConnectionUpdate,
) -> Result<OrgConnectionTarget, ProjectError> {
    let mut store = load_store(project)?;
    if let Some(new_name) = &update.name {
        if store
            .connections
            .iter()
            .any(|c| c.name == *new_name && c.id != key && c.name != key)
        {
            return Err(ProjectError::DuplicateConnection {
                name: new_name.clone(),
            });
        }
    }
    let target = store
        .connections
        .iter_mut()
        .find(|c| c.id == key || c.name == key)
        .ok_or_else(|| ProjectError::UnknownConnection {
            key: key.to_owned(),
        })?;
    if let Some(name) = update.name {
        target.name = name;
    }
    if let Some(url) = update.instance_url {
        target.instance_url = url;
    }
    if update.access_token.is_some() {
        target.access_token = update.access_token;
    }
    if update.refresh_token.is_some() {
        target.refresh_token = update.refresh_token;
    }
    let updated = target.clone();
    save_store(project, &store)?;
    Ok(updated)
}

/// Remove a target identified by id or name.
pub fn remove_connection(project: &Project, key: &str) -> Result<OrgConnectionTarget, ProjectError> {
    let mut store = load_store(project)?;
    let Some(pos) = store
        .connections
        .iter()
        .position(|c| c.id == key || c.name == key)
    else {
        return Err(ProjectError::UnknownConnection {
            key: key.to_owned(),
        });
    };
    let removed = store.connections.remove(pos);
    save_store(project, &store)?;
    tracing::info!(name = %removed.name, "removed org connection");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{init_at, ProjectSettings};
    use tempfile::TempDir;

    fn project(tmp: &TempDir) -> Project {
        init_at(
            tmp.path(),
            ProjectSettings::new("demo", "https://demo.my.salesforce.com"),
        )
        .unwrap()
    }

    fn new_conn(name: &str) -> NewConnection {
        NewConnection {
            name: name.into(),
            instance_url: format!("https://{name}.my.salesforce.com"),
            access_token: Some("token".into()),
            refresh_token: None,
        }
    }

    #[test]
    fn crud_round_trip() {
        let tmp = TempDir::new().unwrap();
        let project = project(&tmp);
        assert!(list_connections(&project).unwrap().is_empty());

        let qa = add_connection(&project, new_conn("qa")).unwrap();
        add_connection(&project, new_conn("uat")).unwrap();
        assert_eq!(list_connections(&project).unwrap().len(), 2);

        let updated = update_connection(
            &project,
            &qa.id,
            ConnectionUpdate {
                instance_url: Some("https://qa2.my.salesforce.com".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.instance_url, "https://qa2.my.salesforce.com");
        assert_eq!(updated.access_token.as_deref(), Some("token"));
        assert_eq!(find_connection(&project, "qa").unwrap().id, qa.id);

        remove_connection(&project, "uat").unwrap();
        let names: Vec<_> = list_connections(&project)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["qa".to_string()]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let project = project(&tmp);
        add_connection(&project, new_conn("qa")).unwrap();
        let err = add_connection(&project, new_conn("qa")).unwrap_err();
        assert!(matches!(err, ProjectError::DuplicateConnection { .. }));
    }

    #[test]
    fn unknown_connection_errors() {
        let tmp = TempDir::new().unwrap();
        let project = project(&tmp);
        let err = remove_connection(&project, "ghost").unwrap_err();
        assert!(matches!(err, ProjectError::UnknownConnection { .. }));
        assert!(err.to_string().contains("ghost"));
    }
}

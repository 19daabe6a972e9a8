// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project and global-variable persistence.

use crate::{Store, StorageError};
use pw_core::{Canvas, GlobalVariable, Project};
use sqlx::FromRow;
use uuid::Uuid;

/// Insert parameters for a new project.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub id: String,
    pub name: String,
    pub is_system: bool,
    pub canvas: Canvas,
}

#[derive(Debug, FromRow)]
struct ProjectRow {
    id: String,
    name: String,
    is_system: i64,
    canvas_data: String,
    created_at: String,
    updated_at: String,
}

impl ProjectRow {
    fn into_project(self) -> Result<Project, StorageError> {
        Ok(Project {
            id: self.id,
            name: self.name,
            is_system: self.is_system != 0,
            canvas: serde_json::from_str(&self.canvas_data)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl Store {
    pub async fn insert_project(
        &self,
        new: NewProject,
        created_at: &str,
    ) -> Result<Project, StorageError> {
        let canvas = serde_json::to_string(&new.canvas)?;
        sqlx::query(
            "INSERT INTO projects (id, name, is_system, canvas_data, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.id)
        .bind(&new.name)
        .bind(new.is_system as i64)
        .bind(&canvas)
        .bind(created_at)
        .bind(created_at)
        .execute(self.pool())
        .await?;
        self.get_project(&new.id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("project {}", new.id)))
    }

    pub async fn get_project(&self, id: &str) -> Result<Option<Project>, StorageError> {
        let row: Option<ProjectRow> = sqlx::query_as(
            "SELECT id, name, is_system, canvas_data, created_at, updated_at \
             FROM projects WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.map(ProjectRow::into_project).transpose()
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, StorageError> {
        let rows: Vec<ProjectRow> = sqlx::query_as(
            "SELECT id, name, is_system, canvas_data, created_at, updated_at \
             FROM projects ORDER BY name ASC",
        )
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(ProjectRow::into_project).collect()
    }

    pub async fn update_project_canvas(
        &self,
        id: &str,
        canvas: &Canvas,
        updated_at: &str,
    ) -> Result<(), StorageError> {
        let canvas = serde_json::to_string(canvas)?;
        let result =
            sqlx::query("UPDATE projects SET canvas_data = ?, updated_at = ? WHERE id = ?")
                .bind(&canvas)
                .bind(updated_at)
                .bind(id)
                .execute(self.pool())
                .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("project {id}")));
        }
        Ok(())
    }

    /// Delete a project; system projects are protected.
    pub async fn delete_project(&self, id: &str) -> Result<(), StorageError> {
        let project = self
            .get_project(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("project {id}")))?;
        if project.is_system {
            return Err(StorageError::Conflict(format!(
                "project {id} is a system project and cannot be deleted"
            )));
        }
        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Create or update a project-scoped variable by name.
    pub async fn upsert_global_variable(
        &self,
        project_id: &str,
        var: &GlobalVariable,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO global_variables (id, project_id, name, value, type, description, \
             folder) VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (project_id, name) DO UPDATE SET value = excluded.value, \
             type = excluded.type, description = excluded.description, folder = excluded.folder",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(project_id)
        .bind(&var.name)
        .bind(&var.value)
        .bind(&var.var_type)
        .bind(&var.description)
        .bind(&var.folder)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn list_global_variables(
        &self,
        project_id: &str,
    ) -> Result<Vec<GlobalVariable>, StorageError> {
        #[derive(FromRow)]
        struct VarRow {
            name: String,
            value: String,
            var_type: Option<String>,
            description: Option<String>,
            folder: Option<String>,
        }

        let rows: Vec<VarRow> = sqlx::query_as(
            "SELECT name, value, type AS var_type, description, folder FROM global_variables \
             WHERE project_id = ? ORDER BY name ASC",
        )
        .bind(project_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| GlobalVariable {
                name: r.name,
                value: r.value,
                var_type: r.var_type,
                description: r.description,
                folder: r.folder,
            })
            .collect())
    }

    pub async fn delete_global_variable(
        &self,
        project_id: &str,
        name: &str,
    ) -> Result<(), StorageError> {
        let result =
            sqlx::query("DELETE FROM global_variables WHERE project_id = ? AND name = ?")
                .bind(project_id)
                .bind(name)
                .execute(self.pool())
                .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "variable {name} in project {project_id}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "projects_tests.rs"]
mod tests;

use super::{PgRepos, RouteRepository, StudentRepository};
use crate::domain::transport::{Route, Student};
use crate::domain::types::{RouteId, StudentId};
use crate::error::{FeesError, Result};
use async_trait::async_trait;
use sqlx::Row;

#[async_trait]
impl StudentRepository for PgRepos {
    async fn get_student(&self, id: &StudentId) -> Result<Option<Student>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, enrolled, allocated_route_id, boarding_stop
            FROM students
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FeesError::database("get_student", e))?;

        Ok(row.map(|r| {
            let allocated: Option<String> = r.get("allocated_route_id");
            Student {
                id: StudentId::new(r.get::<String, _>("id")),
                name: r.get("name"),
                enrolled: r.get("enrolled"),
                allocated_route_id: allocated.map(RouteId::new),
                boarding_stop: r.get("boarding_stop"),
            }
        }))
    }
}

#[async_trait]
impl RouteRepository for PgRepos {
    async fn get_route(&self, id: &RouteId) -> Result<Option<Route>> {
        let row = sqlx::query("SELECT id, name, active FROM routes WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| FeesError::database("get_route", e))?;

        Ok(row.map(|r| Route {
            id: RouteId::new(r.get::<String, _>("id")),
            name: r.get("name"),
            active: r.get("active"),
        }))
    }
}

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::tasks::{
    filter::{like_pattern, TaskFilter},
    repo_types::{
        CategoryCount, NewTask, OwnerCount, PriorityCount, Task, TaskRecord, TaskStats,
    },
};

/// Task store.
#[async_trait]
pub trait TaskRepo: Send + Sync {
    async fn create(&self, task: NewTask) -> anyhow::Result<TaskRecord>;

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<TaskRecord>>;

    async fn list(&self, filter: &TaskFilter) -> anyhow::Result<Vec<TaskRecord>>;

    /// Writes every mutable column of `task`. `None` if the row no longer exists.
    async fn save(&self, task: &Task) -> anyhow::Result<Option<TaskRecord>>;

    /// `true` if a row was removed.
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Removes every completed task and returns how many went.
    async fn purge_completed(&self) -> anyhow::Result<u64>;

    async fn stats(&self) -> anyhow::Result<TaskStats>;
}

// `t` is either the tasks table or a CTE over it; `u` is the owner.
const RECORD_COLUMNS: &str = "t.id, t.title, t.description, t.status, t.priority, t.category, \
     t.due_date, t.completed, t.completed_at, t.owner_id, t.created_at, t.updated_at, \
     u.name AS owner_name, u.email AS owner_email";

#[derive(Clone)]
pub struct PgTaskRepo {
    db: PgPool,
}

impl PgTaskRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskRepo for PgTaskRepo {
    async fn create(&self, task: NewTask) -> anyhow::Result<TaskRecord> {
        let sql = format!(
            r#"
            WITH t AS (
                INSERT INTO tasks (id, title, description, status, priority, category,
                                   due_date, completed, completed_at, owner_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                RETURNING *
            )
            SELECT {RECORD_COLUMNS}
            FROM t JOIN users u ON u.id = t.owner_id
            "#
        );
        let record = sqlx::query_as::<_, TaskRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.status)
            .bind(task.priority)
            .bind(&task.category)
            .bind(task.due_date)
            .bind(task.completed)
            .bind(task.completed_at)
            .bind(task.owner_id)
            .fetch_one(&self.db)
            .await?;
        Ok(record)
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<TaskRecord>> {
        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM tasks t JOIN users u ON u.id = t.owner_id
            WHERE t.id = $1
            "#
        );
        let record = sqlx::query_as::<_, TaskRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(record)
    }

    async fn list(&self, filter: &TaskFilter) -> anyhow::Result<Vec<TaskRecord>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {RECORD_COLUMNS} FROM tasks t JOIN users u ON u.id = t.owner_id WHERE TRUE"
        ));

        if let Some(owner) = filter.owner {
            qb.push(" AND t.owner_id = ").push_bind(owner);
        }
        if let Some(status) = filter.status {
            qb.push(" AND t.status = ").push_bind(status);
        }
        if let Some(priority) = filter.priority {
            qb.push(" AND t.priority = ").push_bind(priority);
        }
        if let Some(category) = &filter.category {
            qb.push(" AND t.category = ").push_bind(category.clone());
        }
        if let Some(completed) = filter.completed {
            qb.push(" AND t.completed = ").push_bind(completed);
        }
        if let Some(before) = filter.due_before {
            qb.push(" AND t.due_date <= ").push_bind(before);
        }
        if let Some(after) = filter.due_after {
            qb.push(" AND t.due_date >= ").push_bind(after);
        }
        if let Some(search) = &filter.search {
            let pattern = like_pattern(search);
            qb.push(" AND (t.title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR t.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        qb.push(" ORDER BY ")
            .push(filter.sort.column())
            .push(" ")
            .push(filter.order.keyword())
            .push(" NULLS LAST, t.id");

        let records = qb
            .build_query_as::<TaskRecord>()
            .fetch_all(&self.db)
            .await?;
        Ok(records)
    }

    async fn save(&self, task: &Task) -> anyhow::Result<Option<TaskRecord>> {
        let sql = format!(
            r#"
            WITH t AS (
                UPDATE tasks
                SET title = $2, description = $3, status = $4, priority = $5, category = $6,
                    due_date = $7, completed = $8, completed_at = $9, updated_at = $10
                WHERE id = $1
                RETURNING *
            )
            SELECT {RECORD_COLUMNS}
            FROM t JOIN users u ON u.id = t.owner_id
            "#
        );
        let record = sqlx::query_as::<_, TaskRecord>(&sql)
            .bind(task.id)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.status)
            .bind(task.priority)
            .bind(&task.category)
            .bind(task.due_date)
            .bind(task.completed)
            .bind(task.completed_at)
            .bind(task.updated_at)
            .fetch_optional(&self.db)
            .await?;
        Ok(record)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_completed(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM tasks WHERE completed")
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> anyhow::Result<TaskStats> {
        let (total_tasks, completed_tasks): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE completed)
            FROM tasks
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let by_priority = sqlx::query_as::<_, PriorityCount>(
            r#"
            SELECT priority, COUNT(*) AS count
            FROM tasks
            GROUP BY priority
            ORDER BY priority
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let by_category = sqlx::query_as::<_, CategoryCount>(
            r#"
            SELECT category, COUNT(*) AS count
            FROM tasks
            WHERE category IS NOT NULL
            GROUP BY category
            ORDER BY category
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let by_user = sqlx::query_as::<_, OwnerCount>(
            r#"
            SELECT u.id AS user_id, u.name, u.email, COUNT(*) AS count
            FROM tasks t JOIN users u ON u.id = t.owner_id
            GROUP BY u.id, u.name, u.email
            ORDER BY count DESC, u.email
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(TaskStats {
            total_tasks,
            completed_tasks,
            pending_tasks: total_tasks - completed_tasks,
            by_priority,
            by_category,
            by_user,
        })
    }
}

/// Runs the SQL against a real database alongside the in-memory store the
/// router tests use. Needs `DATABASE_URL`; run with `cargo test -- --ignored`.
#[cfg(test)]
mod tests {
    use time::{macros::datetime, OffsetDateTime};

    use super::*;
    use crate::auth::{
        repo::{PgUserRepo, UserRepo},
        repo_types::{NewUser, Role},
    };
    use crate::memory::MemoryStore;
    use crate::tasks::{
        filter::{SortField, SortOrder},
        repo_types::{TaskPatch, TaskPriority},
    };

    fn owner() -> NewUser {
        NewUser {
            email: "owner@example.com".into(),
            password_hash: "hash".into(),
            name: "Owner".into(),
            role: Role::Regular,
        }
    }

    fn tasks(owner_id: Uuid) -> Vec<NewTask> {
        let now = OffsetDateTime::now_utc();
        let task = |title: &str, priority, due| {
            NewTask::new(
                owner_id,
                title.to_string(),
                TaskPatch {
                    priority: Some(priority),
                    due_date: Some(due),
                    ..TaskPatch::default()
                },
                now,
            )
        };
        vec![
            task("Undated", TaskPriority::High, None),
            task("Late 100% done", TaskPriority::Low, Some(datetime!(2031-01-01 0:00 UTC))),
            task("Early", TaskPriority::Medium, Some(datetime!(2030-01-01 0:00 UTC))),
            task("Plain 100 done", TaskPriority::Medium, Some(datetime!(2032-01-01 0:00 UTC))),
        ]
    }

    async fn titles(repo: &dyn TaskRepo, filter: &TaskFilter) -> Vec<String> {
        repo.list(filter)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.task.title)
            .collect()
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore]
    async fn list_orders_and_searches_like_the_memory_store(pool: PgPool) {
        let pg = PgTaskRepo::new(pool.clone());
        let memory = MemoryStore::default();

        let pg_owner = PgUserRepo::new(pool).create(owner()).await.unwrap().unwrap();
        let mem_owner = UserRepo::create(&memory, owner()).await.unwrap().unwrap();
        for task in tasks(pg_owner.id) {
            pg.create(task).await.unwrap();
        }
        for task in tasks(mem_owner.id) {
            TaskRepo::create(&memory, task).await.unwrap();
        }

        let filters = [
            TaskFilter {
                sort: SortField::DueDate,
                order: SortOrder::Asc,
                ..TaskFilter::default()
            },
            TaskFilter {
                sort: SortField::DueDate,
                order: SortOrder::Desc,
                ..TaskFilter::default()
            },
            TaskFilter {
                sort: SortField::Priority,
                order: SortOrder::Asc,
                due_before: Some(datetime!(2031-06-01 0:00 UTC)),
                ..TaskFilter::default()
            },
            TaskFilter {
                search: Some("100%".into()),
                ..TaskFilter::default()
            },
            TaskFilter {
                search: Some("plain_100".into()),
                ..TaskFilter::default()
            },
        ];

        for filter in &filters {
            assert_eq!(
                titles(&pg, filter).await,
                titles(&memory, filter).await,
                "{filter:?}"
            );
        }

        let asc = titles(&pg, &filters[0]).await;
        assert_eq!(asc, ["Early", "Late 100% done", "Plain 100 done", "Undated"]);
        let desc = titles(&pg, &filters[1]).await;
        assert_eq!(desc.last().map(String::as_str), Some("Undated"));
        assert_eq!(titles(&pg, &filters[2]).await, ["Late 100% done", "Early"]);
        assert_eq!(titles(&pg, &filters[3]).await, ["Late 100% done"]);
        assert!(titles(&pg, &filters[4]).await.is_empty());
    }
}

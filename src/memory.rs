//! In-memory store used by router tests in place of Postgres.

use std::{cmp::Ordering, collections::BTreeMap, collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{
    repo::UserRepo,
    repo_types::{NewUser, User},
};
use crate::tasks::{
    filter::{SortField, SortOrder, TaskFilter},
    repo::TaskRepo,
    repo_types::{
        CategoryCount, NewTask, OwnerCount, PriorityCount, Task, TaskRecord, TaskStats,
    },
};

#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<Uuid, User>>,
    tasks: Mutex<HashMap<Uuid, Task>>,
}

impl MemoryStore {
    /// Stored password hash for `email`, to check that plaintext never lands.
    pub fn password_hash_of(&self, email: &str) -> Option<String> {
        self.users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .map(|u| u.password_hash.clone())
    }

    fn record(&self, task: Task) -> TaskRecord {
        let users = self.users.lock().unwrap();
        let owner = users.get(&task.owner_id);
        TaskRecord {
            owner_name: owner.map(|u| u.name.clone()).unwrap_or_default(),
            owner_email: owner.map(|u| u.email.clone()).unwrap_or_default(),
            task,
        }
    }
}

fn matches(filter: &TaskFilter, task: &Task) -> bool {
    let before_ok = filter
        .due_before
        .map_or(true, |bound| task.due_date.map_or(false, |due| due <= bound));
    let after_ok = filter
        .due_after
        .map_or(true, |bound| task.due_date.map_or(false, |due| due >= bound));
    let search_ok = match &filter.search {
        None => true,
        Some(needle) => {
            let needle = needle.to_lowercase();
            task.title.to_lowercase().contains(&needle)
                || task
                    .description
                    .as_deref()
                    .map_or(false, |d| d.to_lowercase().contains(&needle))
        }
    };

    filter.owner.map_or(true, |o| task.owner_id == o)
        && filter.status.map_or(true, |s| task.status == s)
        && filter.priority.map_or(true, |p| task.priority == p)
        && filter
            .category
            .as_ref()
            .map_or(true, |c| task.category.as_ref() == Some(c))
        && filter.completed.map_or(true, |c| task.completed == c)
        && before_ok
        && after_ok
        && search_ok
}

/// Nulls go last in either direction, matching `NULLS LAST`.
fn cmp_nullable<T: Ord>(a: &Option<T>, b: &Option<T>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => directed(a.cmp(b), order),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

fn compare(a: &Task, b: &Task, sort: SortField, order: SortOrder) -> Ordering {
    let primary = match sort {
        SortField::CreatedAt => directed(a.created_at.cmp(&b.created_at), order),
        SortField::UpdatedAt => directed(a.updated_at.cmp(&b.updated_at), order),
        SortField::DueDate => cmp_nullable(&a.due_date, &b.due_date, order),
        SortField::CompletedAt => cmp_nullable(&a.completed_at, &b.completed_at, order),
        SortField::Title => directed(a.title.cmp(&b.title), order),
        SortField::Status => directed(a.status.cmp(&b.status), order),
        SortField::Priority => directed(a.priority.cmp(&b.priority), order),
        SortField::Category => cmp_nullable(&a.category, &b.category, order),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn create(&self, user: NewUser) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == user.email) {
            return Ok(None);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            name: user.name,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(Some(user))
    }
}

#[async_trait]
impl TaskRepo for MemoryStore {
    async fn create(&self, task: NewTask) -> anyhow::Result<TaskRecord> {
        let now = OffsetDateTime::now_utc();
        let task = Task {
            id: Uuid::new_v4(),
            title: task.title,
            description: task.description,
            status: task.status,
            priority: task.priority,
            category: task.category,
            due_date: task.due_date,
            completed: task.completed,
            completed_at: task.completed_at,
            owner_id: task.owner_id,
            created_at: now,
            updated_at: now,
        };
        self.tasks.lock().unwrap().insert(task.id, task.clone());
        Ok(self.record(task))
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<TaskRecord>> {
        let task = self.tasks.lock().unwrap().get(&id).cloned();
        Ok(task.map(|t| self.record(t)))
    }

    async fn list(&self, filter: &TaskFilter) -> anyhow::Result<Vec<TaskRecord>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| matches(filter, t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| compare(a, b, filter.sort, filter.order));
        Ok(tasks.into_iter().map(|t| self.record(t)).collect())
    }

    async fn save(&self, task: &Task) -> anyhow::Result<Option<TaskRecord>> {
        let updated = {
            let mut tasks = self.tasks.lock().unwrap();
            match tasks.get_mut(&task.id) {
                Some(stored) => {
                    *stored = task.clone();
                    true
                }
                None => false,
            }
        };
        Ok(updated.then(|| self.record(task.clone())))
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.tasks.lock().unwrap().remove(&id).is_some())
    }

    async fn purge_completed(&self) -> anyhow::Result<u64> {
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|_, t| !t.completed);
        Ok((before - tasks.len()) as u64)
    }

    async fn stats(&self) -> anyhow::Result<TaskStats> {
        let tasks = self.tasks.lock().unwrap();
        let users = self.users.lock().unwrap();

        let total_tasks = tasks.len() as i64;
        let completed_tasks = tasks.values().filter(|t| t.completed).count() as i64;

        let mut priorities = BTreeMap::new();
        let mut categories = BTreeMap::new();
        let mut owners: HashMap<Uuid, i64> = HashMap::new();
        for task in tasks.values() {
            *priorities.entry(task.priority).or_insert(0i64) += 1;
            if let Some(category) = &task.category {
                *categories.entry(category.clone()).or_insert(0i64) += 1;
            }
            *owners.entry(task.owner_id).or_insert(0) += 1;
        }

        let mut by_user: Vec<OwnerCount> = owners
            .into_iter()
            .filter_map(|(id, count)| {
                users.get(&id).map(|u| OwnerCount {
                    user_id: id,
                    name: u.name.clone(),
                    email: u.email.clone(),
                    count,
                })
            })
            .collect();
        by_user.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.email.cmp(&b.email)));

        Ok(TaskStats {
            total_tasks,
            completed_tasks,
            pending_tasks: total_tasks - completed_tasks,
            by_priority: priorities
                .into_iter()
                .map(|(priority, count)| PriorityCount { priority, count })
                .collect(),
            by_category: categories
                .into_iter()
                .map(|(category, count)| CategoryCount { category, count })
                .collect(),
            by_user,
        })
    }
}

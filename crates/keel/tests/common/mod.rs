//! Todo-list domain shared by the integration tests

#![allow(dead_code)]

use keel::prelude::*;
use keel::EventView;
use tempfile::TempDir;

pub const TENANT: &str = "tenant-1";

pub const LIST_CREATED: &str = "LIST_CREATED";
pub const LIST_DELETED: &str = "LIST_DELETED";
pub const ITEM_ADDED: &str = "ITEM_ADDED";
pub const ITEM_REMOVED: &str = "ITEM_REMOVED";
pub const ITEM_COMPLETED: &str = "ITEM_COMPLETED";
pub const ITEM_MARKED_INCOMPLETE: &str = "ITEM_MARKED_INCOMPLETE";
pub const ITEM_COMPLETION_SET: &str = "ITEM_COMPLETION_SET";
pub const ITEM_PRIORITY_SET: &str = "ITEM_PRIORITY_SET";
pub const EXAMPLE_EVENT: &str = "EXAMPLE_EVENT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TodoEvent {
    #[serde(rename = "LIST_CREATED", rename_all = "camelCase")]
    ListCreated {
        tenant_id: String,
        list_id: String,
        name: String,
    },
    #[serde(rename = "LIST_DELETED", rename_all = "camelCase")]
    ListDeleted { list_id: String },
    #[serde(rename = "ITEM_ADDED", rename_all = "camelCase")]
    ItemAdded {
        list_id: String,
        item_id: String,
        title: String,
    },
    #[serde(rename = "ITEM_REMOVED", rename_all = "camelCase")]
    ItemRemoved {
        tenant_id: String,
        list_id: String,
        item_id: String,
    },
    #[serde(rename = "ITEM_COMPLETED", rename_all = "camelCase")]
    ItemCompleted {
        tenant_id: String,
        list_id: String,
        item_id: String,
    },
    #[serde(rename = "ITEM_MARKED_INCOMPLETE", rename_all = "camelCase")]
    ItemMarkedIncomplete {
        tenant_id: String,
        list_id: String,
        item_id: String,
    },
    #[serde(rename = "ITEM_COMPLETION_SET", rename_all = "camelCase")]
    ItemCompletionSet {
        tenant_id: String,
        list_id: String,
        item_id: String,
        completed: bool,
    },
    #[serde(rename = "ITEM_PRIORITY_SET", rename_all = "camelCase")]
    ItemPrioritySet {
        tenant_id: String,
        list_id: String,
        item_id: String,
        priority: i64,
    },
    #[serde(rename = "EXAMPLE_EVENT", rename_all = "camelCase")]
    Example {
        tenant_id: String,
        string_field: String,
        number_field: f64,
        boolean_field: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        optional_field: Option<String>,
    },
}

impl DomainEvent for TodoEvent {
    fn event_type(&self) -> &str {
        match self {
            TodoEvent::ListCreated { .. } => LIST_CREATED,
            TodoEvent::ListDeleted { .. } => LIST_DELETED,
            TodoEvent::ItemAdded { .. } => ITEM_ADDED,
            TodoEvent::ItemRemoved { .. } => ITEM_REMOVED,
            TodoEvent::ItemCompleted { .. } => ITEM_COMPLETED,
            TodoEvent::ItemMarkedIncomplete { .. } => ITEM_MARKED_INCOMPLETE,
            TodoEvent::ItemCompletionSet { .. } => ITEM_COMPLETION_SET,
            TodoEvent::ItemPrioritySet { .. } => ITEM_PRIORITY_SET,
            TodoEvent::Example { .. } => EXAMPLE_EVENT,
        }
    }
}

pub fn list_created(list_id: &str, name: &str) -> TodoEvent {
    TodoEvent::ListCreated {
        tenant_id: TENANT.into(),
        list_id: list_id.into(),
        name: name.into(),
    }
}

pub fn item_added(list_id: &str, item_id: &str, title: &str) -> TodoEvent {
    TodoEvent::ItemAdded {
        list_id: list_id.into(),
        item_id: item_id.into(),
        title: title.into(),
    }
}

pub fn item_removed(list_id: &str, item_id: &str) -> TodoEvent {
    TodoEvent::ItemRemoved {
        tenant_id: TENANT.into(),
        list_id: list_id.into(),
        item_id: item_id.into(),
    }
}

pub fn item_completed(list_id: &str, item_id: &str) -> TodoEvent {
    TodoEvent::ItemCompleted {
        tenant_id: TENANT.into(),
        list_id: list_id.into(),
        item_id: item_id.into(),
    }
}

pub fn item_marked_incomplete(list_id: &str, item_id: &str) -> TodoEvent {
    TodoEvent::ItemMarkedIncomplete {
        tenant_id: TENANT.into(),
        list_id: list_id.into(),
        item_id: item_id.into(),
    }
}

pub fn priority_set(list_id: &str, item_id: &str, priority: i64) -> TodoEvent {
    TodoEvent::ItemPrioritySet {
        tenant_id: TENANT.into(),
        list_id: list_id.into(),
        item_id: item_id.into(),
        priority,
    }
}

pub fn example(string_field: &str, number_field: f64, boolean_field: bool) -> TodoEvent {
    TodoEvent::Example {
        tenant_id: TENANT.into(),
        string_field: string_field.into(),
        number_field,
        boolean_field,
        optional_field: None,
    }
}

// ---------------------------------------------------------------------------
// List projection

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListState {
    pub list_id: String,
    pub name: String,
    pub incomplete_items: Vec<Item>,
    pub completed_items: Vec<Item>,
    pub removed_items: Vec<Item>,
}

pub struct ListProjection {
    pub list_id: String,
}

impl ListProjection {
    pub fn new(list_id: &str) -> Self {
        Self {
            list_id: list_id.into(),
        }
    }
}

fn find<'a>(items: &'a [Item], id: &str) -> Option<&'a Item> {
    items.iter().find(|i| i.id == id)
}

impl Projection for ListProjection {
    type Event = TodoEvent;
    type State = ListState;

    fn projection_type(&self) -> &str {
        "list"
    }

    fn id(&self) -> &str {
        &self.list_id
    }

    fn streams(&self) -> Vec<StreamSpec> {
        vec![StreamSpec::new([
            LIST_CREATED,
            ITEM_ADDED,
            ITEM_COMPLETED,
            ITEM_MARKED_INCOMPLETE,
            ITEM_REMOVED,
        ])
        .with_filter(Filter::new().eq("listId", self.list_id.as_str()))]
    }

    fn initial_state(&self) -> ListState {
        ListState {
            list_id: self.list_id.clone(),
            name: String::new(),
            incomplete_items: Vec::new(),
            completed_items: Vec::new(),
            removed_items: Vec::new(),
        }
    }

    fn fold(&self, mut state: ListState, event: &TodoEvent) -> ListState {
        match event {
            TodoEvent::ListCreated { name, .. } => state.name = name.clone(),
            TodoEvent::ItemAdded { item_id, title, .. } => state.incomplete_items.push(Item {
                id: item_id.clone(),
                text: title.clone(),
            }),
            TodoEvent::ItemCompleted { item_id, .. } => {
                if let Some(item) = find(&state.incomplete_items, item_id).cloned() {
                    state.completed_items.push(item);
                }
                state.incomplete_items.retain(|i| &i.id != item_id);
            }
            TodoEvent::ItemMarkedIncomplete { item_id, .. } => {
                if let Some(item) = find(&state.completed_items, item_id).cloned() {
                    if find(&state.incomplete_items, item_id).is_none() {
                        state.incomplete_items.push(item);
                    }
                }
                state.completed_items.retain(|i| &i.id != item_id);
            }
            TodoEvent::ItemRemoved { item_id, .. } => {
                let item = find(&state.completed_items, item_id)
                    .or_else(|| find(&state.incomplete_items, item_id))
                    .cloned();
                if let Some(item) = item {
                    if find(&state.removed_items, item_id).is_none() {
                        state.removed_items.push(item);
                    }
                }
                state.completed_items.retain(|i| &i.id != item_id);
                state.incomplete_items.retain(|i| &i.id != item_id);
            }
            _ => {}
        }
        state
    }
}

// ---------------------------------------------------------------------------
// Validators

fn item_streams(list_id: &str, item_id: &str) -> Vec<StreamSpec> {
    vec![StreamSpec::new([
        ITEM_COMPLETED,
        ITEM_MARKED_INCOMPLETE,
        ITEM_ADDED,
        ITEM_REMOVED,
    ])
    .with_filter(
        Filter::new()
            .eq("listId", list_id)
            .eq("itemId", item_id),
    )]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Complete,
    Incomplete,
}

fn to_completion(status: Option<Completion>, event: &TodoEvent) -> Option<Completion> {
    match event {
        TodoEvent::ItemCompleted { .. } => Some(Completion::Complete),
        TodoEvent::ItemMarkedIncomplete { .. } => Some(Completion::Incomplete),
        TodoEvent::ItemAdded { .. } => status.or(Some(Completion::Incomplete)),
        _ => status,
    }
}

fn to_present(present: bool, event: &TodoEvent) -> bool {
    match event {
        TodoEvent::ItemAdded { .. } => true,
        TodoEvent::ItemRemoved { .. } => false,
        _ => present,
    }
}

/// A list holds at most three incomplete items
pub struct AddItemValidator {
    pub list_id: String,
}

impl AddItemValidator {
    pub fn new(list_id: &str) -> Self {
        Self {
            list_id: list_id.into(),
        }
    }
}

impl Validator for AddItemValidator {
    type Event = TodoEvent;

    fn streams(&self) -> Vec<StreamSpec> {
        vec![StreamSpec::new([
            ITEM_ADDED,
            ITEM_REMOVED,
            ITEM_COMPLETED,
            ITEM_MARKED_INCOMPLETE,
        ])
        .with_filter(Filter::new().eq("listId", self.list_id.as_str()))]
    }

    fn is_valid(&self, events: &EventView<'_, TodoEvent>) -> Result<()> {
        let ids = events.reduce(
            |mut ids: Vec<String>, event| {
                match event {
                    TodoEvent::ItemAdded { item_id, .. } => ids.push(item_id.clone()),
                    TodoEvent::ItemRemoved { item_id, .. }
                    | TodoEvent::ItemCompleted { item_id, .. } => ids.retain(|id| id != item_id),
                    TodoEvent::ItemMarkedIncomplete { item_id, .. } => {
                        ids.retain(|id| id != item_id);
                        ids.push(item_id.clone());
                    }
                    _ => {}
                }
                ids
            },
            Vec::new(),
        );
        if ids.len() > 3 {
            return Err(KeelError::invariant("Incomplete item count is greater than three"));
        }
        Ok(())
    }
}

/// Only a present, incomplete item can be completed
pub struct CompleteItemValidator {
    pub list_id: String,
    pub item_id: String,
}

impl CompleteItemValidator {
    pub fn new(list_id: &str, item_id: &str) -> Self {
        Self {
            list_id: list_id.into(),
            item_id: item_id.into(),
        }
    }
}

impl Validator for CompleteItemValidator {
    type Event = TodoEvent;

    fn streams(&self) -> Vec<StreamSpec> {
        item_streams(&self.list_id, &self.item_id)
    }

    fn is_valid(&self, events: &EventView<'_, TodoEvent>) -> Result<()> {
        if !events.reduce(to_present, false) {
            return Err(KeelError::invariant("Item is not present in list"));
        }
        if events.reduce_db(to_completion, None) != Some(Completion::Incomplete) {
            return Err(KeelError::invariant("Item is not incomplete"));
        }
        Ok(())
    }
}

/// Only a present, completed item can be marked incomplete
pub struct MarkItemIncompleteValidator {
    pub list_id: String,
    pub item_id: String,
}

impl MarkItemIncompleteValidator {
    pub fn new(list_id: &str, item_id: &str) -> Self {
        Self {
            list_id: list_id.into(),
            item_id: item_id.into(),
        }
    }
}

impl Validator for MarkItemIncompleteValidator {
    type Event = TodoEvent;

    fn streams(&self) -> Vec<StreamSpec> {
        item_streams(&self.list_id, &self.item_id)
    }

    fn is_valid(&self, events: &EventView<'_, TodoEvent>) -> Result<()> {
        if !events.reduce_db(to_present, false) {
            return Err(KeelError::invariant("Item is not present in list"));
        }
        if events.reduce_db(to_completion, None) != Some(Completion::Complete) {
            return Err(KeelError::invariant("Item is not complete"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Setup

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn memory_db() -> KeelDb {
    init_tracing();
    KeelDb::open_in_memory().unwrap()
}

/// File-backed database; keep the `TempDir` alive for the test's duration
pub fn file_db() -> (TempDir, KeelDb) {
    init_tracing();
    let temp_dir = tempfile::tempdir().unwrap();
    let db = KeelDb::open(temp_dir.path()).unwrap();
    (temp_dir, db)
}

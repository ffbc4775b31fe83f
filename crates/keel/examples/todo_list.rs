//! Todo list on keel
//!
//! This example demonstrates:
//! - Defining a typed event union
//! - Appending events and reading a filtered stream
//! - Folding a projection and saving it as a snapshot
//! - Guarding a write with a validator and handling a lost race
//!
//! Run with: cargo run --example todo_list

use keel::prelude::*;
use keel::EventView;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
enum TodoEvent {
    #[serde(rename = "LIST_CREATED", rename_all = "camelCase")]
    ListCreated { list_id: String, name: String },
    #[serde(rename = "ITEM_ADDED", rename_all = "camelCase")]
    ItemAdded {
        list_id: String,
        item_id: String,
        title: String,
    },
    #[serde(rename = "ITEM_COMPLETED", rename_all = "camelCase")]
    ItemCompleted { list_id: String, item_id: String },
}

impl DomainEvent for TodoEvent {
    fn event_type(&self) -> &str {
        match self {
            TodoEvent::ListCreated { .. } => "LIST_CREATED",
            TodoEvent::ItemAdded { .. } => "ITEM_ADDED",
            TodoEvent::ItemCompleted { .. } => "ITEM_COMPLETED",
        }
    }
}

fn add(list_id: &str, item_id: &str, title: &str) -> TodoEvent {
    TodoEvent::ItemAdded {
        list_id: list_id.into(),
        item_id: item_id.into(),
        title: title.into(),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    name: String,
    open: Vec<String>,
    done: Vec<String>,
}

struct ListSummary {
    list_id: String,
}

impl Projection for ListSummary {
    type Event = TodoEvent;
    type State = Summary;

    fn projection_type(&self) -> &str {
        "list_summary"
    }

    fn id(&self) -> &str {
        &self.list_id
    }

    fn streams(&self) -> Vec<StreamSpec> {
        vec![
            StreamSpec::new(["LIST_CREATED", "ITEM_ADDED", "ITEM_COMPLETED"])
                .with_filter(Filter::new().eq("listId", self.list_id.as_str())),
        ]
    }

    fn initial_state(&self) -> Summary {
        Summary::default()
    }

    fn fold(&self, mut state: Summary, event: &TodoEvent) -> Summary {
        match event {
            TodoEvent::ListCreated { name, .. } => state.name = name.clone(),
            TodoEvent::ItemAdded { item_id, .. } => state.open.push(item_id.clone()),
            TodoEvent::ItemCompleted { item_id, .. } => {
                state.open.retain(|id| id != item_id);
                state.done.push(item_id.clone());
            }
        }
        state
    }
}

/// A list holds at most `limit` items
struct ItemLimit {
    list_id: String,
    limit: usize,
}

impl Validator for ItemLimit {
    type Event = TodoEvent;

    fn streams(&self) -> Vec<StreamSpec> {
        vec![StreamSpec::new(["ITEM_ADDED"])
            .with_filter(Filter::new().eq("listId", self.list_id.as_str()))]
    }

    fn is_valid(&self, events: &EventView<'_, TodoEvent>) -> Result<()> {
        if events.len() > self.limit {
            return Err(KeelError::invariant(format!(
                "list {} is full ({} items)",
                self.list_id, self.limit
            )));
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("keel=info,keel_sqlite=info,keel_runner=debug")
        .init();

    let temp_dir = tempfile::tempdir()?;
    let db = KeelDb::open(temp_dir.path().join("todo"))?;
    println!("Opened database in {:?}", db.base_path());

    // Append
    let client = db.client::<TodoEvent>();
    client
        .append(&TodoEvent::ListCreated {
            list_id: "groceries".into(),
            name: "Groceries".into(),
        })
        .await?;
    client
        .append_batch(&[add("groceries", "milk", "milk"), add("groceries", "eggs", "eggs")])
        .await?;

    // Read a filtered stream
    let added = client
        .stream(
            StreamSpec::new(["ITEM_ADDED"]).with_filter(Filter::new().eq("listId", "groceries")),
            None,
        )
        .await?;
    println!("{} items added", added.len());

    // Project and snapshot
    let runner = db.projection_runner(
        ListSummary {
            list_id: "groceries".into(),
        },
        RunnerOptions::load_existing(),
    );
    let anchored_at = runner.save().await?;
    println!("Snapshot at event {}: {:?}", anchored_at, runner.as_json().await?);

    // Validate, then append only if nothing raced us
    let limit = || ItemLimit {
        list_id: "groceries".into(),
        limit: 3,
    };
    let mut first = db.validation_runner(limit());
    let mut second = db.validation_runner(limit());
    first.apply(add("groceries", "bread", "bread"));
    second.apply(add("groceries", "jam", "jam"));
    first.is_valid().await?;
    second.is_valid().await?;

    first.save().await?;
    match second.save().await {
        Err(e) if e.is_conflict() => {
            println!("Second writer lost the race: {}", e);
            second.refresh().await?;
            match second.save().await {
                Err(KeelError::InvariantViolation(msg)) => println!("Retry rejected: {}", msg),
                other => println!("Retry result: {:?}", other.map(|saved| saved.len())),
            }
        }
        other => println!("Unexpected result: {:?}", other.map(|saved| saved.len())),
    }

    // Resume the projection from its snapshot
    let resumed = db.projection_runner(
        ListSummary {
            list_id: "groceries".into(),
        },
        RunnerOptions::load_existing(),
    );
    println!(
        "Resumed with {} new events: {:?}",
        resumed.get_events().await?.len(),
        resumed.as_json().await?
    );

    Ok(())
}

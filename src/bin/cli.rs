use std::time::Duration;
use celerix_objects::model::{Animal, Object, Person};
use celerix_objects::sdk;
use celerix_objects::store::{DecodePolicy, ObjectStore, StoreOptions};
use celerix_objects::ObjectDb;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "Store and query Celerix objects", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "data")]
    data_dir: String,

    /// Abandon an operation after this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Skip records that cannot be decoded instead of failing.
    #[arg(long)]
    skip_malformed: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    PutPerson {
        id: String,
        name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        #[arg(long, default_value = "")]
        birthday: String,
        /// RFC 3339 timestamp, e.g. 1990-01-01T00:00:00Z.
        #[arg(long)]
        birth_date: Option<DateTime<Utc>>,
    },
    PutAnimal {
        id: String,
        name: String,
        #[arg(long = "type", default_value = "")]
        species: String,
        #[arg(long, default_value = "")]
        owner_id: String,
    },
    Get { id: String },
    Find { name: String },
    GetKind { kind: String, id: String },
    List { kind: String },
    Delete { id: String },
    Kinds,
    /// Runs the store/get/find/list/delete walkthrough.
    Demo,
}

fn print_object(object: &dyn Object) -> anyhow::Result<()> {
    println!("{} {}", object.kind(), serde_json::to_string_pretty(&object.to_json()?)?);
    Ok(())
}

async fn demo(store: &ObjectStore) -> anyhow::Result<()> {
    let person = Person {
        name: "John Doe".to_string(),
        id: "123".to_string(),
        last_name: "Doe".to_string(),
        birthday: "01-01-1990".to_string(),
        ..Default::default()
    };
    store.store(&person).await?;

    let retrieved = store.get_by_id("123").await?;
    print!("Retrieved person: ");
    print_object(retrieved.as_ref())?;

    let animal = Animal {
        name: "Rex".to_string(),
        id: "456".to_string(),
        species: "Dog".to_string(),
        owner_id: "123".to_string(),
    };
    store.store(&animal).await?;

    let retrieved = store.get_by_name("Rex").await?;
    print!("Retrieved animal: ");
    print_object(retrieved.as_ref())?;

    println!("List of persons:");
    for object in store.list_objects(person.kind()).await? {
        print_object(object.as_ref())?;
    }

    store.delete_object("123").await?;
    println!("Object deleted successfully");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut options = StoreOptions::default();
    if let Some(ms) = cli.timeout_ms {
        options = options.with_timeout(Duration::from_millis(ms));
    }
    if cli.skip_malformed {
        options = options.with_decode_policy(DecodePolicy::Skip);
    }
    let store = sdk::open(&cli.data_dir, options).await?;

    match cli.command {
        Commands::PutPerson { id, name, last_name, birthday, birth_date } => {
            let person = Person {
                name,
                id,
                last_name,
                birthday,
                birth_date: birth_date.unwrap_or_default(),
            };
            store.store(&person).await?;
            println!("OK");
        }
        Commands::PutAnimal { id, name, species, owner_id } => {
            store.store(&Animal { name, id, species, owner_id }).await?;
            println!("OK");
        }
        Commands::Get { id } => print_object(store.get_by_id(&id).await?.as_ref())?,
        Commands::Find { name } => print_object(store.get_by_name(&name).await?.as_ref())?,
        Commands::GetKind { kind, id } => print_object(store.get(&kind, &id).await?.as_ref())?,
        Commands::List { kind } => {
            let objects = store.list_objects(&kind).await?;
            let values = objects
                .iter()
                .map(|o| o.to_json())
                .collect::<Result<Vec<_>, _>>()?;
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
        Commands::Delete { id } => {
            store.delete_object(&id).await?;
            println!("OK");
        }
        Commands::Kinds => {
            println!("{}", serde_json::to_string_pretty(&store.registry().kinds())?);
        }
        Commands::Demo => demo(&store).await?,
    }

    store.flush().await?;
    Ok(())
}

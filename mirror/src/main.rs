use bson::{doc, Bson, Document};
use clap::{Parser, Subcommand};
use mirror::{argument, Mode, Options, Proxy, Record, RemoteError};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about = "Drive a sample object graph through a mirror proxy")]
struct CliArguments {
    /// Keep the object in this thread instead of a worker thread
    #[arg(long)]
    local: bool,
    /// Give up waiting for a result after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
    #[command(subcommand)]
    sub_command: SubCommands,
}

#[derive(Subcommand)]
enum SubCommands {
    /// Ask the person's dog to bark
    Bark {
        #[arg(long)]
        loud: bool,
    },
    /// Give the dog an age it did not have before, then read it back
    Adopt {
        #[arg()]
        age: i32,
    },
    /// Run the model simulation on a value
    Simulate {
        #[arg()]
        value: i32,
    },
}

fn dog() -> Record {
    Record::new().method("bark", |_, args, kwargs| {
        let loud = argument(&args, &kwargs, 0, "loud")?
            .as_bool()
            .unwrap_or(false);
        let sound = "woof-woof";
        Ok(Bson::from(if loud { sound.to_uppercase() } else { sound.to_string() }))
    })
}

fn model() -> Record {
    Record::new().method("simulate", |this, args, kwargs| {
        let value = argument(&args, &kwargs, 0, "value")?
            .as_i32()
            .ok_or_else(|| RemoteError::InvalidArgument {
                name: "value".into(),
                reason: "expected an int32".into(),
            })?;
        info!(fields = ?this, "simulating");
        Ok(Bson::Int32(3 * value))
    })
}

fn person() -> Record {
    Record::new()
        .object("dog", dog())
        .object("model", model())
}

fn main() -> mirror::Result<()> {
    let command = CliArguments::parse();

    let filter = if command.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = Options {
        mode: if command.local { Mode::Local } else { Mode::Isolated },
        default_timeout_ms: command.timeout_ms,
        ..Options::default()
    };
    let proxy = Proxy::with_options(person(), &options)?;

    match command.sub_command {
        SubCommands::Bark { loud } => {
            let future = proxy
                .child("dog")
                .child("bark")
                .call(vec![], doc! { "loud": loud })?;
            println!("{}", future.result(None)?);
        }
        SubCommands::Adopt { age } => {
            // the dog has no age until this write lands
            proxy.child("dog").set("age", age)?;
            let future = proxy.child("dog").child("age").retrieve()?;
            println!("{}", future.result(None)?);
        }
        SubCommands::Simulate { value } => {
            proxy.child("model").set("foo", 3)?;
            let future = proxy
                .child("model")
                .child("simulate")
                .call(vec![Bson::Int32(value)], Document::new())?;
            println!("{}", future.result(None)?);
        }
    }

    proxy.wait_all_futures()?;
    proxy.terminate()
}

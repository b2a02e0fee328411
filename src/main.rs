use dirnav::prelude::*;

#[cfg(target_arch = "wasm32")]
fn main() -> DirNavResult<()> {
    Err(DirNavError::from("no main for wasm builds"))
}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> DirNavResult<()> {
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::DEBUG.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
    tracing::debug!("running dirnav {}", full_version());

    let tree = MemoryTree::new();
    let navigator = Navigator::new(tree.root().await);

    navigator
        .write(
            "/projects/dirnav/README.md",
            b"# dirnav\n",
            WriteOptions::default(),
        )
        .await?;
    navigator
        .write("/notes/todo.txt", b"- walk paths\n", WriteOptions::default())
        .await?;

    navigator.cd("/projects").await?;
    tracing::info!(cwd = %navigator.pwd(), "changed directory");

    navigator
        .write("../notes/todo.txt", b"- copy trees\n", WriteOptions::append())
        .await?;
    let todo = navigator.read_to_string("/notes/todo.txt").await?;
    tracing::info!(content = ?todo, "appended to sibling file");

    navigator.copy_directory("/", "/backup").await?;

    let directories = navigator
        .ls_filtered("/backup", |_, entry| async move {
            Ok::<_, NavigatorError>(entry.is_directory())
        })
        .await?;
    for (name, entry) in directories {
        let location = navigator.resolve(Locator::Handle(entry)).await?;
        tracing::info!(name = %name, location = %location, "backup directory");
    }

    let metrics = tree.metrics().await;
    tracing::info!(
        directory_lookups = metrics.directory_lookups.len(),
        file_lookups = metrics.file_lookups.len(),
        bytes_written = metrics.bytes_written,
        "memory tree activity"
    );

    Ok(())
}

//! Life Chest CLI - Command line interface for vault operations.
//!
//! This tool provides a command-line interface for creating, managing,
//! and operating on encrypted vaults, and for moving files between
//! vaults as LCEF containers.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use lifechest_common::{SensitiveBytes, VaultId};
use lifechest_lcef::{export_file, import_containers, Container, EXTENSION};
use lifechest_storage::LocalStore;
use lifechest_vault::{
    CredentialPurpose, CredentialRequest, CredentialSource, EncryptionLevel, FileImport,
    SortMethod, TreeNode, UnlockContext, UnlockMechanism, VaultManager, VaultPolicy, VaultSession,
};

#[derive(Parser)]
#[command(name = "lifechest")]
#[command(about = "Life Chest - Encrypted vault management")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding the vaults (default: the user data directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new vault.
    Create {
        /// Display name of the vault.
        name: String,

        /// Unlock mechanism: "password" or "pin".
        #[arg(short, long, default_value = "pin")]
        mechanism: UnlockMechanism,

        /// Closure level: 0 never, 1 ask, 2 immediately.
        #[arg(short, long, default_value_t = 2)]
        level: u8,
    },

    /// List all vaults.
    Vaults,

    /// Show vault information.
    Info {
        /// Vault id or name.
        vault: String,
    },

    /// List a directory.
    Ls {
        /// Vault id or name.
        vault: String,

        /// Directory id (default: root).
        dir: Option<String>,

        /// Sort method (default: the vault's preference).
        #[arg(short, long)]
        sort: Option<SortMethod>,
    },

    /// Print the whole file tree.
    Tree {
        /// Vault id or name.
        vault: String,
    },

    /// Add a file to the vault.
    Add {
        /// Vault id or name.
        vault: String,

        /// Source file to add.
        source: PathBuf,

        /// Destination directory id (default: root).
        #[arg(short, long)]
        parent: Option<String>,

        /// Name inside the vault (default: source file name).
        #[arg(short, long)]
        name: Option<String>,

        /// Mime type of the content.
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,

        /// Preview image stored alongside the file.
        #[arg(long)]
        thumbnail: Option<PathBuf>,
    },

    /// Extract a file from the vault.
    Extract {
        /// Vault id or name.
        vault: String,

        /// File id.
        file: String,

        /// Destination file path.
        dest: PathBuf,
    },

    /// Write a byte range of a file to standard output.
    ReadRange {
        /// Vault id or name.
        vault: String,

        /// File id.
        file: String,

        offset: u64,

        length: usize,
    },

    /// Create a directory in the vault.
    Mkdir {
        /// Vault id or name.
        vault: String,

        /// Directory name.
        name: String,

        /// Parent directory id (default: root).
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Rename a file or directory.
    Rename {
        /// Vault id or name.
        vault: String,

        /// Node id.
        node: String,

        /// New name.
        name: String,
    },

    /// Move a file or directory.
    Mv {
        /// Vault id or name.
        vault: String,

        /// Node id.
        node: String,

        /// Target directory id.
        parent: String,
    },

    /// Remove a file or directory.
    Rm {
        /// Vault id or name.
        vault: String,

        /// Node id.
        node: String,
    },

    /// Export a file as an LCEF container.
    Export {
        /// Vault id or name.
        vault: String,

        /// File id.
        file: String,

        /// Destination (default: `<name>.lcef` in the current directory).
        dest: Option<PathBuf>,
    },

    /// Import LCEF containers.
    Import {
        /// Vault id or name.
        vault: String,

        /// Container files.
        #[arg(required = true)]
        containers: Vec<PathBuf>,

        /// Destination directory id (default: root).
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Rename a vault.
    RenameVault {
        /// Vault id or name.
        vault: String,

        /// New name.
        name: String,
    },

    /// Change the closure level of a vault.
    SetLevel {
        /// Vault id or name.
        vault: String,

        /// 0 never, 1 ask, 2 immediately.
        level: u8,
    },

    /// Change the display sort method of a vault.
    SetSort {
        /// Vault id or name.
        vault: String,

        sort: SortMethod,
    },

    /// Delete a vault and everything in it.
    DeleteVault {
        /// Vault id or name.
        vault: String,

        /// Confirm deletion.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let app = App::new(cli.root)?;

    match cli.command {
        Commands::Create {
            name,
            mechanism,
            level,
        } => app.cmd_create(name, mechanism, level).await,

        Commands::Vaults => app.cmd_vaults(),

        Commands::Info { vault } => app.cmd_info(&vault),

        Commands::Ls { vault, dir, sort } => app.cmd_ls(&vault, dir, sort).await,

        Commands::Tree { vault } => app.cmd_tree(&vault).await,

        Commands::Add {
            vault,
            source,
            parent,
            name,
            mime,
            thumbnail,
        } => {
            app.cmd_add(&vault, &source, parent, name, mime, thumbnail)
                .await
        }

        Commands::Extract { vault, file, dest } => app.cmd_extract(&vault, &file, &dest).await,

        Commands::ReadRange {
            vault,
            file,
            offset,
            length,
        } => app.cmd_read_range(&vault, &file, offset, length).await,

        Commands::Mkdir {
            vault,
            name,
            parent,
        } => app.cmd_mkdir(&vault, name, parent).await,

        Commands::Rename { vault, node, name } => app.cmd_rename(&vault, &node, name).await,

        Commands::Mv {
            vault,
            node,
            parent,
        } => app.cmd_move(&vault, &node, &parent).await,

        Commands::Rm { vault, node } => app.cmd_remove(&vault, &node).await,

        Commands::Export { vault, file, dest } => app.cmd_export(&vault, &file, dest).await,

        Commands::Import {
            vault,
            containers,
            parent,
        } => app.cmd_import(&vault, &containers, parent).await,

        Commands::RenameVault { vault, name } => app.cmd_rename_vault(&vault, name),

        Commands::SetLevel { vault, level } => app.cmd_set_level(&vault, level),

        Commands::SetSort { vault, sort } => app.cmd_set_sort(&vault, sort),

        Commands::DeleteVault { vault, yes } => app.cmd_delete_vault(&vault, yes),
    }
}

/// Prompts for secrets on the terminal.
struct TerminalCredentials;

#[async_trait]
impl CredentialSource for TerminalCredentials {
    async fn request_secret(&self, request: &CredentialRequest<'_>) -> Option<SensitiveBytes> {
        let what = match request.mechanism {
            UnlockMechanism::Pin => "PIN",
            _ => "password",
        };
        let vault = request
            .vault_name
            .map(str::to_string)
            .unwrap_or_else(|| request.vault_id.to_string());

        let secret = Zeroizing::new(
            rpassword::prompt_password(format!("Enter {} for {}: ", what, vault)).ok()?,
        );
        if request.purpose == CredentialPurpose::Create {
            let confirm =
                Zeroizing::new(rpassword::prompt_password(format!("Confirm {}: ", what)).ok()?);
            if *confirm != *secret {
                eprintln!("Entries do not match");
                return None;
            }
        }
        Some(SensitiveBytes::from(secret.as_str()))
    }
}

struct App {
    manager: VaultManager,
    credentials: TerminalCredentials,
}

impl App {
    fn new(root: Option<PathBuf>) -> Result<Self> {
        let root = match root {
            Some(root) => root,
            None => dirs::data_dir()
                .context("No user data directory; pass --root")?
                .join("lifechest"),
        };
        let store = LocalStore::new(&root)
            .with_context(|| format!("Failed to open vault root {}", root.display()))?;

        Ok(Self {
            manager: VaultManager::new(Arc::new(store)).with_version_code(version_code()),
            credentials: TerminalCredentials,
        })
    }

    fn ctx(&self) -> UnlockContext<'_> {
        UnlockContext::new(&self.credentials)
    }

    /// Find a vault by id, then by name.
    fn resolve(&self, vault: &str) -> Result<VaultId> {
        let configs = self.manager.list_vaults()?;
        if let Some(config) = configs.iter().find(|config| config.id.as_str() == vault) {
            return Ok(config.id.clone());
        }

        let mut named = configs.into_iter().filter(|config| config.name == vault);
        match (named.next(), named.next()) {
            (Some(config), None) => Ok(config.id),
            (Some(_), Some(_)) => bail!("Several vaults are named {:?}; use the id", vault),
            (None, _) => bail!("No vault {:?}", vault),
        }
    }

    async fn open(&self, vault: &str) -> Result<VaultSession> {
        let id = self.resolve(vault)?;
        self.manager
            .open_vault(&id, &self.ctx())
            .await
            .context("Failed to open vault")
    }

    fn load(&self, vault: &str) -> Result<VaultSession> {
        let id = self.resolve(vault)?;
        Ok(self.manager.load_vault(&id)?)
    }

    /// Create a new vault.
    async fn cmd_create(&self, name: String, mechanism: UnlockMechanism, level: u8) -> Result<()> {
        info!("Creating new vault: {}", name);

        let level = EncryptionLevel::try_from(level)?;
        let policy = VaultPolicy::new(name, mechanism).with_encryption_level(level);
        let session = self
            .manager
            .create_vault(policy, &self.ctx())
            .await
            .context("Failed to create vault")?;

        println!("Vault created successfully!");
        println!("  ID: {}", session.vault_id());
        println!("  Name: {}", session.config().name);
        println!("  Unlock: {}", mechanism);
        Ok(())
    }

    /// List all vaults.
    fn cmd_vaults(&self) -> Result<()> {
        let configs = self.manager.list_vaults()?;
        if configs.is_empty() {
            println!("No vaults.");
        }
        for config in configs {
            println!(
                "{}  {}  ({})",
                config.id, config.name, config.unlock_mechanism_type
            );
        }
        Ok(())
    }

    /// Show vault information.
    fn cmd_info(&self, vault: &str) -> Result<()> {
        let session = self.load(vault)?;
        let config = session.config();

        println!("Vault Information:");
        println!("  ID: {}", config.id);
        println!("  Name: {}", config.name);
        println!("  Created: {}", config.creation_date);
        println!("  Unlock: {}", config.unlock_mechanism_type);
        println!("  Closure level: {}", u8::from(config.encryption_level));
        println!("  Sort: {}", config.sort_method);
        println!("  Version code: {}", config.version_code);
        Ok(())
    }

    /// List directory contents.
    async fn cmd_ls(&self, vault: &str, dir: Option<String>, sort: Option<SortMethod>) -> Result<()> {
        let mut session = self.open(vault).await?;
        let sort = sort.unwrap_or(session.config().sort_method);
        let dir = or_root(&session, dir)?;

        let ops = session.operations()?;
        let children = ops.list(&dir, sort).context("Failed to list directory")?;
        if children.is_empty() {
            println!("Directory is empty.");
        }
        for node in children {
            print_entry(node, 0);
        }
        Ok(())
    }

    /// Print the whole tree.
    async fn cmd_tree(&self, vault: &str) -> Result<()> {
        let session = self.open(vault).await?;
        let tree = session.tree()?;
        print_tree(tree.root(), 0);
        println!("{} files, {} bytes", tree.count(), tree.size());
        Ok(())
    }

    /// Add a file to the vault.
    async fn cmd_add(
        &self,
        vault: &str,
        source: &Path,
        parent: Option<String>,
        name: Option<String>,
        mime: String,
        thumbnail: Option<PathBuf>,
    ) -> Result<()> {
        info!("Adding file {} to vault", source.display());

        let name = match name {
            Some(name) => name,
            None => source
                .file_name()
                .context("Source has no file name")?
                .to_string_lossy()
                .into_owned(),
        };
        let reader = BufReader::new(
            File::open(source)
                .with_context(|| format!("Failed to read source file {}", source.display()))?,
        );
        let mut import = FileImport::new(name, mime);
        if let Some(path) = thumbnail {
            import = import.with_thumbnail(std::fs::read(&path).context("Failed to read thumbnail")?);
        }

        let mut session = self.open(vault).await?;
        let parent = or_root(&session, parent)?;
        let node = session
            .operations()?
            .import_file(&parent, import, reader)
            .context("Failed to add file")?;

        println!("File added: {} ({} bytes)", node.id(), node.size);
        Ok(())
    }

    /// Extract a file from the vault.
    async fn cmd_extract(&self, vault: &str, file: &str, dest: &Path) -> Result<()> {
        let mut session = self.open(vault).await?;
        let writer = BufWriter::new(File::create(dest).context("Failed to create output file")?);
        let written = session
            .operations()?
            .extract_to(file, writer)
            .context("Failed to read file from vault")?;

        println!("File extracted: {} ({} bytes)", dest.display(), written);
        Ok(())
    }

    /// Write a byte range to stdout.
    async fn cmd_read_range(&self, vault: &str, file: &str, offset: u64, length: usize) -> Result<()> {
        let mut session = self.open(vault).await?;
        let bytes = session.operations()?.read_range(file, offset, length)?;

        let mut stdout = io::stdout().lock();
        stdout.write_all(&bytes)?;
        stdout.flush()?;
        Ok(())
    }

    /// Create a directory in the vault.
    async fn cmd_mkdir(&self, vault: &str, name: String, parent: Option<String>) -> Result<()> {
        let mut session = self.open(vault).await?;
        let parent = or_root(&session, parent)?;
        let id = session
            .operations()?
            .create_directory(&parent, name)
            .context("Failed to create directory")?;

        println!("Directory created: {}", id);
        Ok(())
    }

    async fn cmd_rename(&self, vault: &str, node: &str, name: String) -> Result<()> {
        let mut session = self.open(vault).await?;
        session.operations()?.rename(node, name)?;
        println!("Renamed: {}", node);
        Ok(())
    }

    async fn cmd_move(&self, vault: &str, node: &str, parent: &str) -> Result<()> {
        let mut session = self.open(vault).await?;
        session.operations()?.move_node(node, parent)?;
        println!("Moved: {}", node);
        Ok(())
    }

    /// Remove a file or directory.
    async fn cmd_remove(&self, vault: &str, node: &str) -> Result<()> {
        let mut session = self.open(vault).await?;
        session
            .operations()?
            .delete(node)
            .context("Failed to remove node")?;

        println!("Removed: {}", node);
        Ok(())
    }

    /// Export a file as a container.
    async fn cmd_export(&self, vault: &str, file: &str, dest: Option<PathBuf>) -> Result<()> {
        let session = self.open(vault).await?;
        let dest = match dest {
            Some(dest) => dest,
            None => PathBuf::from(format!("{}.{}", session.tree()?.file(file)?.name, EXTENSION)),
        };

        let writer = BufWriter::new(File::create(&dest).context("Failed to create container")?);
        let written = export_file(&session, file, writer).context("Failed to export file")?;

        println!("Exported: {} ({} bytes)", dest.display(), written);
        Ok(())
    }

    /// Import containers.
    async fn cmd_import(&self, vault: &str, paths: &[PathBuf], parent: Option<String>) -> Result<()> {
        let containers = paths
            .iter()
            .map(|path| {
                let file = File::open(path)
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                Container::open(BufReader::new(file))
                    .with_context(|| format!("Not a valid container: {}", path.display()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut session = self.open(vault).await?;
        let parent = or_root(&session, parent)?;
        let nodes = import_containers(&mut session, &parent, containers, &self.ctx())
            .await
            .context("Failed to import containers")?;

        for node in nodes {
            println!("Imported: {}  {}", node.id(), node.name);
        }
        Ok(())
    }

    fn cmd_rename_vault(&self, vault: &str, name: String) -> Result<()> {
        self.load(vault)?.rename(name)?;
        println!("Vault renamed.");
        Ok(())
    }

    fn cmd_set_level(&self, vault: &str, level: u8) -> Result<()> {
        self.load(vault)?
            .set_encryption_level(EncryptionLevel::try_from(level)?)?;
        println!("Closure level set to {}.", level);
        Ok(())
    }

    fn cmd_set_sort(&self, vault: &str, sort: SortMethod) -> Result<()> {
        self.load(vault)?.set_sort_method(sort)?;
        println!("Sort method set to {}.", sort);
        Ok(())
    }

    /// Delete a vault.
    fn cmd_delete_vault(&self, vault: &str, yes: bool) -> Result<()> {
        let id = self.resolve(vault)?;
        if !yes {
            bail!("Refusing to delete vault {} without --yes", id);
        }
        self.manager
            .delete_vault(&id, &self.ctx())
            .context("Failed to delete vault")?;

        println!("Vault deleted: {}", id);
        Ok(())
    }
}

fn version_code() -> u64 {
    env!("CARGO_PKG_VERSION_MAJOR").parse::<u64>().unwrap_or(0) * 10_000
        + env!("CARGO_PKG_VERSION_MINOR").parse::<u64>().unwrap_or(0) * 100
        + env!("CARGO_PKG_VERSION_PATCH").parse::<u64>().unwrap_or(0)
}

fn or_root(session: &VaultSession, id: Option<String>) -> Result<String> {
    match id {
        Some(id) => Ok(id),
        None => Ok(session.tree()?.root_id().to_string()),
    }
}

fn print_entry(node: &TreeNode, depth: usize) {
    let indent = "  ".repeat(depth);
    if node.is_directory() {
        println!("{}[DIR]  {}/  {}", indent, node.name(), node.id());
    } else {
        println!(
            "{}[FILE] {} ({} bytes, {})  {}",
            indent,
            node.name(),
            node.size(),
            node.mime_type(),
            node.id()
        );
    }
}

fn print_tree(node: &TreeNode, depth: usize) {
    print_entry(node, depth);
    if let Some(directory) = node.as_directory() {
        for child in &directory.children {
            print_tree(child, depth + 1);
        }
    }
}

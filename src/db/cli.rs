//! Implementation of the `db *` sub commands.
//!
//! Query results are written to stdout as JSON.

use std::io::Write;

use thousands::Separable;

use crate::{
    common,
    db::{filter::AnnotationFilter, model::GeneSet, Store, StoreConfig},
};

fn open_store(config: &StoreConfig) -> Result<Store, anyhow::Error> {
    Store::open(config).map_err(|e| anyhow::anyhow!("could not open database {}: {}", &config.path_db, e))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), anyhow::Error> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Command line arguments for `db summary` sub command.
#[derive(Debug, clap::Parser)]
#[command(about = "print analysis summaries of a file", long_about = None)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub store: StoreConfig,
    /// Content hash of the file.
    #[arg(long)]
    pub file_hash: String,
}

/// Main entry point for `db summary` sub command.
pub fn run_summary(args_common: &common::Args, args: &SummaryArgs) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let store = open_store(&args.store)?;
    if store.get_file(&args.file_hash)?.is_none() {
        anyhow::bail!("no file with hash {}", &args.file_hash);
    }
    let report = store
        .report(&args.file_hash)
        .map_err(|e| anyhow::anyhow!("could not compute summary: {}", e))?;
    tracing::info!(
        "file has {} genes, {} variants, {} effects",
        report.file.genes.separate_with_commas(),
        report.file.variations.separate_with_commas(),
        report.file.effects.separate_with_commas()
    );
    print_json(&report)
}

/// Command line arguments for `db files` sub command.
#[derive(Debug, clap::Parser)]
#[command(about = "list registered files", long_about = None)]
pub struct FilesArgs {
    #[command(flatten)]
    pub store: StoreConfig,
}

/// Main entry point for `db files` sub command.
pub fn run_files(args_common: &common::Args, args: &FilesArgs) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let store = open_store(&args.store)?;
    let files = store.get_files()?;
    tracing::info!("{} files registered", files.len().separate_with_commas());
    print_json(&files)
}

/// Command line arguments for `db delete-file` sub command.
#[derive(Debug, clap::Parser)]
#[command(about = "delete a file and everything derived from it", long_about = None)]
pub struct DeleteFileArgs {
    #[command(flatten)]
    pub store: StoreConfig,
    /// Content hash of the file.
    #[arg(long)]
    pub file_hash: String,
}

/// Main entry point for `db delete-file` sub command.
pub fn run_delete_file(
    args_common: &common::Args,
    args: &DeleteFileArgs,
) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let store = open_store(&args.store)?;
    if store.delete_file(&args.file_hash)? {
        tracing::info!("deleted file {}", &args.file_hash);
        Ok(())
    } else {
        anyhow::bail!("no file with hash {}", &args.file_hash)
    }
}

/// Command line arguments for `db variants` sub command.
#[derive(Debug, clap::Parser)]
#[command(about = "print variants of a gene", long_about = None)]
pub struct VariantsArgs {
    #[command(flatten)]
    pub store: StoreConfig,
    /// Content hash of the file.
    #[arg(long)]
    pub file_hash: String,
    /// HGNC symbol of the gene.
    #[arg(long)]
    pub gene: String,
    /// Print annotations instead of variants.
    #[arg(long, default_value_t = false)]
    pub annotations: bool,
    /// Restrict to the annotations of this variant.
    #[arg(long, requires = "annotations")]
    pub gene_variation: Option<i64>,
    #[command(flatten)]
    pub filter: AnnotationFilter,
}

/// Main entry point for `db variants` sub command.
pub fn run_variants(args_common: &common::Args, args: &VariantsArgs) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let store = open_store(&args.store)?;
    if args.annotations {
        let annotations = store.get_annotations(
            &args.file_hash,
            &args.gene,
            args.gene_variation,
            &args.filter,
        )?;
        tracing::info!("{} annotations", annotations.len().separate_with_commas());
        print_json(&annotations)
    } else {
        let variants = store.get_variants(&args.file_hash, &args.gene, &args.filter)?;
        tracing::info!("{} variants", variants.len().separate_with_commas());
        print_json(&variants)
    }
}

/// Command line arguments for `db facets` sub command.
#[derive(Debug, clap::Parser)]
#[command(about = "print available annotation filter values of a gene", long_about = None)]
pub struct FacetsArgs {
    #[command(flatten)]
    pub store: StoreConfig,
    /// Content hash of the file.
    #[arg(long)]
    pub file_hash: String,
    /// HGNC symbol of the gene.
    #[arg(long)]
    pub gene: String,
}

/// Main entry point for `db facets` sub command.
pub fn run_facets(args_common: &common::Args, args: &FacetsArgs) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let store = open_store(&args.store)?;
    print_json(&store.get_annotation_facets(&args.file_hash, &args.gene)?)
}

/// Command line arguments for `db gene-set *` sub commands.
#[derive(Debug, clap::Parser)]
#[command(about = "manage gene sets", long_about = None)]
pub struct GeneSetArgs {
    #[command(flatten)]
    pub store: StoreConfig,
    #[command(subcommand)]
    pub command: GeneSetCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum GeneSetCommand {
    /// Create a gene set from a gene list file.
    Add {
        /// Name of the gene set.
        #[arg(long)]
        name: String,
        /// Optional description.
        #[arg(long)]
        description: Option<String>,
        /// Newline-delimited list of HGNC symbols.
        #[arg(long)]
        path_genes: String,
    },
    /// Print all gene sets.
    List,
    /// Delete a gene set.
    Delete {
        #[arg(long)]
        name: String,
    },
}

/// Main entry point for `db gene-set *` sub commands.
pub fn run_gene_set(args_common: &common::Args, args: &GeneSetArgs) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let store = open_store(&args.store)?;
    match &args.command {
        GeneSetCommand::Add {
            name,
            description,
            path_genes,
        } => {
            let genes = common::io::read_gene_list(path_genes)?;
            tracing::info!(
                "creating gene set {} with {} genes",
                name,
                genes.len().separate_with_commas()
            );
            store.create_gene_set(&GeneSet {
                name: name.clone(),
                description: description.clone(),
                genes,
            })?;
            Ok(())
        }
        GeneSetCommand::List => {
            let gene_sets = store
                .get_gene_set_names()?
                .iter()
                .filter_map(|name| store.get_gene_set(name).transpose())
                .collect::<Result<Vec<_>, _>>()?;
            print_json(&gene_sets)
        }
        GeneSetCommand::Delete { name } => {
            if store.delete_gene_set(name)? {
                Ok(())
            } else {
                anyhow::bail!("no gene set named {}", name)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::db::{files::test::file_record, filter::AnnotationFilter, Store, StoreConfig};

    #[test]
    fn gene_set_add_list_delete() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = StoreConfig::new(tmp_dir.join("db.sqlite"));
        let args_common = Default::default();

        super::run_gene_set(
            &args_common,
            &super::GeneSetArgs {
                store: store.clone(),
                command: super::GeneSetCommand::Add {
                    name: "xq28".into(),
                    description: None,
                    path_genes: "tests/seqvars/genes.txt".into(),
                },
            },
        )?;
        super::run_gene_set(
            &args_common,
            &super::GeneSetArgs {
                store: store.clone(),
                command: super::GeneSetCommand::List,
            },
        )?;
        assert_eq!(
            Store::open(&store)?.get_gene_set("xq28")?.map(|set| set.genes),
            Some(vec!["IL9R".to_string(), "SPRY3".to_string(), "VAMP7".to_string()])
        );

        super::run_gene_set(
            &args_common,
            &super::GeneSetArgs {
                store: store.clone(),
                command: super::GeneSetCommand::Delete {
                    name: "xq28".into(),
                },
            },
        )?;
        assert!(super::run_gene_set(
            &args_common,
            &super::GeneSetArgs {
                store,
                command: super::GeneSetCommand::Delete {
                    name: "xq28".into(),
                },
            },
        )
        .is_err());

        Ok(())
    }

    #[test]
    fn summary_and_delete() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let config = StoreConfig::new(tmp_dir.join("db.sqlite"));
        Store::open(&config)?.save_file(&file_record("abc"))?;
        let args_common = Default::default();

        super::run_summary(
            &args_common,
            &super::SummaryArgs {
                store: config.clone(),
                file_hash: "abc".into(),
            },
        )?;
        super::run_variants(
            &args_common,
            &super::VariantsArgs {
                store: config.clone(),
                file_hash: "abc".into(),
                gene: "IL9R".into(),
                annotations: true,
                gene_variation: None,
                filter: AnnotationFilter::default(),
            },
        )?;
        super::run_delete_file(
            &args_common,
            &super::DeleteFileArgs {
                store: config.clone(),
                file_hash: "abc".into(),
            },
        )?;

        assert!(super::run_summary(
            &args_common,
            &super::SummaryArgs {
                store: config,
                file_hash: "abc".into(),
            },
        )
        .is_err());

        Ok(())
    }
}

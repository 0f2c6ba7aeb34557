//! Implementation of `seqvars ingest` subcommand.
//!
//! An upload is hashed, checked against the store, validated, and registered
//! together with a task.  The pipeline itself runs on a dedicated worker
//! thread: annotation and filtration, demultiplexing into per-gene files,
//! filtered companion files, normalization of each gene, and finally one
//! transaction storing all genes and flipping the file to `processed`.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread::JoinHandle,
};

use rayon::prelude::*;
use thousands::Separable;

use crate::{
    common::{self, GenomeReference},
    db::{
        files::{now_rfc3339, Registration},
        model::{FileRecord, FileStatus, Task, TaskStatus},
        Store, StoreConfig,
    },
    seqvars::{
        annotate::{run_pipeline, AnnotatorConfig, Stage},
        filtered::create_filtered_vcf,
        normalize::{normalize_file, GeneData},
        validate::validate_file,
    },
};

/// Command line arguments for `seqvars ingest` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "annotate and ingest a VCF file", long_about = None)]
pub struct Args {
    #[command(flatten)]
    pub store: StoreConfig,
    /// Path to input VCF file, optionally gzip-compressed.
    #[clap(long)]
    pub path_in: String,
    /// Newline-delimited list of HGNC symbols to extract.
    #[clap(long, required_unless_present = "gene_set", conflicts_with = "gene_set")]
    pub path_genes: Option<String>,
    /// Name of a stored gene set to extract.
    #[clap(long)]
    pub gene_set: Option<String>,
    /// Directory receiving the per-gene files.
    #[clap(long, default_value = "data")]
    pub path_data_dir: String,
    #[command(flatten)]
    pub annotator: AnnotatorConfig,
}

/// One pipeline run for a registered file.
#[derive(Debug, Clone)]
struct Job {
    file_hash: String,
    task_id: i64,
    annotation: Stage,
    filtration: Stage,
    dest_dir: PathBuf,
}

/// Run the pipeline of `job` and persist the result; returns the number of genes.
fn process(store: &Store, job: &Job) -> Result<usize, anyhow::Error> {
    tracing::info!("running annotation into {} ...", job.dest_dir.display());
    let before_annotation = std::time::Instant::now();
    let gene_files = run_pipeline(&job.annotation, &job.filtration, &job.dest_dir)
        .map_err(|e| anyhow::anyhow!("annotation failed: {}", e))?;
    tracing::info!(
        "... done annotating {} genes in {:?}",
        gene_files.len().separate_with_commas(),
        before_annotation.elapsed()
    );
    let gene_files = gene_files.into_iter().collect::<Vec<_>>();

    tracing::info!("writing filtered companion files ...");
    gene_files
        .par_iter()
        .map(|(_, path)| {
            create_filtered_vcf(path).map_err(|e| {
                anyhow::anyhow!("could not filter {}: {}", path.display(), e)
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!("normalizing genes ...");
    let before_normalization = std::time::Instant::now();
    let genes = gene_files
        .par_iter()
        .map(|(gene, path)| normalize_file(gene, path))
        .collect::<Result<Vec<GeneData>, _>>()
        .map_err(|e| anyhow::anyhow!("normalization failed: {}", e))?;
    let (variants, annotations) = genes.iter().fold((0, 0), |(v, a), data| {
        (v + data.variants.len(), a + data.annotations.len())
    });
    tracing::info!(
        "... done normalizing {} variants with {} annotations in {:?}",
        variants.separate_with_commas(),
        annotations.separate_with_commas(),
        before_normalization.elapsed()
    );
    common::trace_rss_now();

    tracing::info!("storing genes ...");
    let before_storing = std::time::Instant::now();
    store
        .complete_file(&job.file_hash, &genes)
        .map_err(|e| anyhow::anyhow!("could not store genes: {}", e))?;
    tracing::info!("... done storing genes in {:?}", before_storing.elapsed());

    Ok(genes.len())
}

/// Run `job` and record its outcome on the task.
fn run_job(store: &Store, job: &Job) -> Result<(), anyhow::Error> {
    match process(store, job) {
        Ok(count) => {
            tracing::info!(
                "task {} done, {} genes for file {}",
                job.task_id,
                count.separate_with_commas(),
                &job.file_hash
            );
            store.finish_task(job.task_id, TaskStatus::Done, None)?;
            Ok(())
        }
        Err(e) => {
            let message = e.to_string();
            tracing::error!("task {} failed: {}", job.task_id, &message);
            store.finish_task(job.task_id, TaskStatus::Failed, Some(&message))?;
            Err(e)
        }
    }
}

/// Run `job` on a named thread that logs through the caller's subscriber.
///
/// `gene_list` backs the filtration stage's gene file and lives as long as
/// the job.
fn spawn_worker(
    store: Arc<Store>,
    job: Job,
    gene_list: Option<tempfile::NamedTempFile>,
) -> Result<JoinHandle<Result<(), anyhow::Error>>, std::io::Error> {
    let dispatch = tracing::dispatcher::get_default(|dispatch| dispatch.clone());
    let name = format!(
        "ingest-{}",
        job.file_hash.chars().take(8).collect::<String>()
    );
    std::thread::Builder::new().name(name).spawn(move || {
        tracing::dispatcher::with_default(&dispatch, || {
            let result = run_job(&store, &job);
            drop(gene_list);
            result
        })
    })
}

/// Outcome of [`submit`].
#[derive(Debug)]
pub enum Submission {
    /// The content was processed before; nothing was started.
    AlreadyProcessed,
    /// A task for the content is still running; nothing was started.
    InProgress(Task),
    /// A task was started; the worker returns its outcome when joined.
    Started {
        task: Task,
        worker: JoinHandle<Result<(), anyhow::Error>>,
    },
}

/// Genes to extract, from the gene list file or the stored gene set.
fn resolve_genes(store: &Store, args: &Args) -> Result<Vec<String>, anyhow::Error> {
    match (&args.path_genes, &args.gene_set) {
        (Some(path_genes), _) => common::io::read_gene_list(path_genes)
            .map_err(|e| anyhow::anyhow!("could not read gene list {}: {}", path_genes, e)),
        (None, Some(name)) => match store.get_gene_set(name)? {
            Some(gene_set) => Ok(gene_set.genes),
            None => anyhow::bail!("no gene set named {}", name),
        },
        (None, None) => anyhow::bail!("either a gene list or a gene set is required"),
    }
}

/// Register the upload at `args.path_in` and start its pipeline.
///
/// `make_stages` builds the annotation and filtration stages from the input
/// path, its genome reference, and the gene list file.  Invalid files are
/// rejected before anything is written.
pub fn submit<F>(store: Arc<Store>, args: &Args, make_stages: F) -> Result<Submission, anyhow::Error>
where
    F: FnOnce(&Path, GenomeReference, &Path) -> (Stage, Stage),
{
    let file_hash = common::sha256_hex(&args.path_in)?;
    tracing::info!("file {} has hash {}", &args.path_in, &file_hash);
    if let Some(file) = store.get_file(&file_hash)? {
        if file.status == FileStatus::Processed {
            return Ok(Submission::AlreadyProcessed);
        }
    }

    let reference = validate_file(&args.path_in)?;
    let genes = resolve_genes(&store, args)?;
    tracing::info!(
        "extracting {} genes on {}",
        genes.len().separate_with_commas(),
        reference
    );
    let gene_list = common::io::write_gene_list(&genes)?;

    let path_in = Path::new(&args.path_in);
    let file = FileRecord {
        hash: file_hash.clone(),
        name: path_in
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| args.path_in.clone()),
        path: args.path_in.clone(),
        reference,
        created_at: now_rfc3339(),
        status: FileStatus::Unprocessed,
    };
    let task = match store.register_file(&file)? {
        Registration::AlreadyProcessed => return Ok(Submission::AlreadyProcessed),
        Registration::InProgress(task) => return Ok(Submission::InProgress(task)),
        Registration::Created(task) => task,
        Registration::Retried(task) => {
            tracing::warn!("file {} was not processed before, retrying", &file_hash);
            task
        }
    };

    let (annotation, filtration) = make_stages(path_in, reference, gene_list.path());
    let job = Job {
        file_hash,
        task_id: task.id,
        annotation,
        filtration,
        dest_dir: common::intermediary_dir(&args.path_data_dir, path_in),
    };
    match spawn_worker(store.clone(), job, Some(gene_list)) {
        Ok(worker) => Ok(Submission::Started { task, worker }),
        Err(e) => {
            let message = format!("could not start worker: {}", e);
            store.finish_task(task.id, TaskStatus::Failed, Some(&message))?;
            anyhow::bail!(message)
        }
    }
}

/// Main entry point for `seqvars ingest` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = std::time::Instant::now();
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    common::trace_rss_now();

    let store = Arc::new(Store::open(&args.store).map_err(|e| {
        anyhow::anyhow!("could not open database {}: {}", &args.store.path_db, e)
    })?);
    let submission = submit(store, args, |path_in, reference, path_genes| {
        args.annotator.stages(path_in, reference, path_genes)
    })?;
    match submission {
        Submission::AlreadyProcessed => {
            tracing::info!("file {} was already processed", &args.path_in);
        }
        Submission::InProgress(task) => {
            tracing::warn!(
                "file {} is being processed by task {}, not starting another",
                &args.path_in,
                task.id
            );
        }
        Submission::Started { task, worker } => {
            tracing::info!("started task {}", task.id);
            worker
                .join()
                .map_err(|_| anyhow::anyhow!("worker of task {} panicked", task.id))??;
        }
    }

    tracing::info!(
        "All of `seqvars ingest` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}

#[cfg(all(test, unix))]
mod test {
    use std::{path::Path, sync::Arc};

    use pretty_assertions::assert_eq;

    use super::{submit, Args, Submission};
    use crate::{
        common::{self, GenomeReference},
        db::{
            files::{test::file_record, Registration},
            model::{FileStatus, GeneSet, TaskStatus},
            test::open_store,
            Store, StoreConfig,
        },
        seqvars::annotate::{AnnotatorConfig, Stage},
    };

    fn args(tmp_dir: &temp_testdir::TempDir, path_in: &str) -> Args {
        Args {
            store: StoreConfig::new(tmp_dir.join("db.sqlite")),
            path_in: path_in.into(),
            path_genes: Some("tests/seqvars/genes.txt".into()),
            gene_set: None,
            path_data_dir: tmp_dir.join("data").display().to_string(),
            annotator: AnnotatorConfig::default(),
        }
    }

    /// Stand-in annotator emitting the input unchanged.
    fn cat_stages(path_in: &Path, _: GenomeReference, _: &Path) -> (Stage, Stage) {
        (
            Stage::new("cat", [path_in.display().to_string()]),
            Stage::new("cat", Vec::<String>::new()),
        )
    }

    fn failing_stages(_: &Path, _: GenomeReference, _: &Path) -> (Stage, Stage) {
        (
            Stage::new(
                "sh",
                ["-c".to_string(), "echo no such database >&2; exit 3".to_string()],
            ),
            Stage::new("cat", Vec::<String>::new()),
        )
    }

    fn join(submission: Submission) -> Result<(), anyhow::Error> {
        match submission {
            Submission::Started { worker, .. } => worker
                .join()
                .map_err(|_| anyhow::anyhow!("worker panicked"))?,
            other => anyhow::bail!("unexpected submission: {:?}", other),
        }
    }

    #[test]
    fn ingest_example() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = Arc::new(open_store(&tmp_dir));
        let args = args(&tmp_dir, "tests/seqvars/example.vcf");

        join(submit(store.clone(), &args, cat_stages)?)?;

        let files = store.get_files()?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "example.vcf");
        assert_eq!(files[0].reference, GenomeReference::Grch38);
        assert_eq!(files[0].status, FileStatus::Processed);
        assert_eq!(store.get_genes(&files[0].hash)?, vec!["IL9R", "SPRY3", "VAMP7"]);

        let tasks = store.get_tasks(&files[0].hash)?;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Done);

        let dest_dir = tmp_dir.join("data").join("intermediary").join("example.vcf");
        for gene in ["IL9R", "SPRY3", "VAMP7"] {
            assert!(dest_dir.join(format!("{}.vcf", gene)).exists());
            assert!(dest_dir.join(format!("{}_filtered.vcf", gene)).exists());
        }

        Ok(())
    }

    #[test]
    fn resubmit_processed_file() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = Arc::new(open_store(&tmp_dir));
        let args = args(&tmp_dir, "tests/seqvars/example.vcf");

        join(submit(store.clone(), &args, cat_stages)?)?;
        let again = submit(store.clone(), &args, cat_stages)?;

        assert!(matches!(again, Submission::AlreadyProcessed));
        let hash = &store.get_files()?[0].hash;
        assert_eq!(store.get_tasks(hash)?.len(), 1);

        Ok(())
    }

    #[test]
    fn submit_while_running_starts_no_worker() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = Arc::new(open_store(&tmp_dir));
        let args = args(&tmp_dir, "tests/seqvars/example.vcf");
        let hash = common::sha256_hex(&args.path_in)?;
        let running = match store.register_file(&file_record(&hash))? {
            Registration::Created(task) => task,
            other => anyhow::bail!("unexpected registration: {:?}", other),
        };

        match submit(store.clone(), &args, cat_stages)? {
            Submission::InProgress(task) => assert_eq!(task, running),
            other => anyhow::bail!("unexpected submission: {:?}", other),
        }
        assert_eq!(store.get_tasks(&hash)?, vec![running.clone()]);
        assert!(!tmp_dir.join("data").exists());

        store.finish_task(running.id, TaskStatus::Failed, Some("worker lost"))?;
        join(submit(store.clone(), &args, cat_stages)?)?;
        assert_eq!(
            store.get_file(&hash)?.map(|file| file.status),
            Some(FileStatus::Processed)
        );

        Ok(())
    }

    #[test]
    fn invalid_file_is_rejected_before_registration() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = Arc::new(open_store(&tmp_dir));
        let args = args(&tmp_dir, "tests/seqvars/unsupported_reference.vcf");

        assert!(submit(store.clone(), &args, cat_stages).is_err());
        assert!(store.get_files()?.is_empty());

        Ok(())
    }

    #[test]
    fn failed_annotation_then_retry() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = Arc::new(open_store(&tmp_dir));
        let args = args(&tmp_dir, "tests/seqvars/example.vcf");

        let err = join(submit(store.clone(), &args, failing_stages)?)
            .expect_err("annotation must fail");
        assert!(err.to_string().contains("no such database"), "{}", err);

        let hash = store.get_files()?[0].hash.clone();
        assert_eq!(
            store.get_file(&hash)?.map(|file| file.status),
            Some(FileStatus::Unprocessed)
        );
        let tasks = store.get_tasks(&hash)?;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Failed);
        assert!(tasks[0]
            .message
            .as_deref()
            .unwrap_or_default()
            .contains("no such database"));

        join(submit(store.clone(), &args, cat_stages)?)?;

        let tasks = store.get_tasks(&hash)?;
        assert_eq!(
            tasks.iter().map(|task| task.status).collect::<Vec<_>>(),
            vec![TaskStatus::Failed, TaskStatus::Done]
        );
        assert_eq!(
            store.get_file(&hash)?.map(|file| file.status),
            Some(FileStatus::Processed)
        );

        Ok(())
    }

    #[test]
    fn malformed_record_persists_nothing() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = Arc::new(open_store(&tmp_dir));
        let path_in = tmp_dir.join("broken.vcf");
        let mut content = std::fs::read_to_string("tests/seqvars/example.vcf")?;
        content.push_str(
            "X\tnot-a-position\t.\tG\tA\t50.0\tPASS\t\
             ANN=A|missense_variant|MODERATE|IL9R|ENSG00000124334|transcript|\
             ENST00000244174.11|protein_coding|6/9|c.518G>A|p.Ser173Asn|\
             558/1727|518/1566|173/521||\n",
        );
        std::fs::write(&path_in, content)?;
        let args = args(&tmp_dir, &path_in.display().to_string());

        assert!(join(submit(store.clone(), &args, cat_stages)?).is_err());

        let hash = store.get_files()?[0].hash.clone();
        assert!(store.get_genes(&hash)?.is_empty());
        assert_eq!(
            store.get_file(&hash)?.map(|file| file.status),
            Some(FileStatus::Unprocessed)
        );
        assert_eq!(store.get_tasks(&hash)?[0].status, TaskStatus::Failed);

        Ok(())
    }

    #[test]
    fn genes_from_gene_set() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = Arc::new(open_store(&tmp_dir));
        let mut args = args(&tmp_dir, "tests/seqvars/example.vcf");
        args.path_genes = None;
        args.gene_set = Some("xq28".into());

        assert!(submit(store.clone(), &args, cat_stages).is_err());
        assert!(store.get_files()?.is_empty());

        store.create_gene_set(&GeneSet {
            name: "xq28".into(),
            description: None,
            genes: vec!["IL9R".into()],
        })?;
        join(submit(store.clone(), &args, cat_stages)?)?;
        assert_eq!(store.get_files()?[0].status, FileStatus::Processed);

        Ok(())
    }

    #[test]
    fn store_is_shared_with_worker() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let args = args(&tmp_dir, "tests/seqvars/example.vcf");
        let store = Arc::new(Store::open(&args.store)?);

        let submission = submit(store.clone(), &args, cat_stages)?;
        let task = match &submission {
            Submission::Started { task, .. } => task.clone(),
            other => anyhow::bail!("unexpected submission: {:?}", other),
        };
        assert_eq!(task.status, TaskStatus::Running);
        join(submission)?;

        let tasks = Store::open(&args.store)?.get_tasks(&task.file_hash)?;
        assert_eq!(tasks[0].id, task.id);

        Ok(())
    }
}

//! Running the external annotator and splitting its output by gene.
//!
//! The annotator is a chain of two processes: effect annotation with snpEff
//! followed by restriction to the genes of interest with SnpSift.  The output
//! of the second stage is streamed line by line into one VCF file per gene.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStderr, Command, Stdio},
    thread,
};

use indexmap::IndexMap;
use thousands::Separable;

use crate::{common::GenomeReference, err::AnnotationToolError};

/// Configuration of the snpEff/SnpSift installation.
#[derive(Debug, Clone, clap::Args)]
pub struct AnnotatorConfig {
    /// Java executable used for running snpEff and SnpSift.
    #[arg(long, default_value = "java")]
    pub java: String,
    /// Directory containing `snpEff.jar` and `SnpSift.jar`; `~` is expanded.
    #[arg(long, default_value = "~/snpEff")]
    pub path_snpeff: String,
    /// JVM heap option passed to snpEff.
    #[arg(long, default_value = "-Xmx25g", allow_hyphen_values = true)]
    pub jvm_heap: String,
    /// snpEff database used for GRCh38 input.
    #[arg(long, default_value = "GRCh38.105")]
    pub snpeff_db_grch38: String,
    /// snpEff database used for GRCh37 input.
    #[arg(long, default_value = "GRCh37.75")]
    pub snpeff_db_grch37: String,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            java: "java".into(),
            path_snpeff: "~/snpEff".into(),
            jvm_heap: "-Xmx25g".into(),
            snpeff_db_grch38: "GRCh38.105".into(),
            snpeff_db_grch37: "GRCh37.75".into(),
        }
    }
}

impl AnnotatorConfig {
    /// The snpEff directory with a leading `~` expanded.
    pub fn snpeff_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path_snpeff).as_ref())
    }

    /// The snpEff database to use for `reference`.
    ///
    /// GRCh3x builds map to the configured database versions, UCSC names are
    /// passed through.
    pub fn snpeff_database(&self, reference: GenomeReference) -> String {
        match reference {
            GenomeReference::Grch38 => self.snpeff_db_grch38.clone(),
            GenomeReference::Grch37 => self.snpeff_db_grch37.clone(),
            GenomeReference::Hg19 | GenomeReference::Hg38 => reference.to_string(),
        }
    }

    /// Build the annotation and gene filtration stages for one input file.
    pub fn stages<P, Q>(&self, path_in: P, reference: GenomeReference, path_genes: Q) -> (Stage, Stage)
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let snpeff_dir = self.snpeff_dir();
        let annotation = Stage::new(
            &self.java,
            [
                self.jvm_heap.clone(),
                "-jar".into(),
                snpeff_dir.join("snpEff.jar").display().to_string(),
                "ann".into(),
                "-noStats".into(),
                self.snpeff_database(reference),
                path_in.as_ref().display().to_string(),
            ],
        );
        let filtration = Stage::new(
            &self.java,
            [
                "-jar".into(),
                snpeff_dir.join("SnpSift.jar").display().to_string(),
                "filter".into(),
                "-s".into(),
                path_genes.as_ref().display().to_string(),
                "ANN[0].GENE in SET[0]".into(),
            ],
        );
        (annotation, filtration)
    }
}

/// One external command of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub program: String,
    pub args: Vec<String>,
}

impl Stage {
    pub fn new<I>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().collect(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Extract the gene symbol of the first `ANN` block of a data line.
///
/// Only the first block is considered, so a variant affecting several genes
/// is routed to the gene of its first annotation only.
pub fn gene_of_line(line: &str) -> Option<&str> {
    let (_, ann) = line.split_once("ANN=")?;
    let mut fields = ann.splitn(5, '|');
    let gene = fields.nth(3)?;
    // The gene field must be followed by a further field.
    fields.next()?;
    if gene.is_empty() {
        None
    } else {
        Some(gene)
    }
}

/// Routes annotated VCF lines to one output file per gene.
///
/// Header lines are buffered and written to each per-gene file when it is
/// created, so memory use is bounded by the header plus one line.
pub struct GeneDemultiplexer {
    dest_dir: PathBuf,
    header: Vec<String>,
    writers: IndexMap<String, (PathBuf, BufWriter<File>)>,
    dropped: usize,
}

impl GeneDemultiplexer {
    pub fn new<P: AsRef<Path>>(dest_dir: P) -> Self {
        Self {
            dest_dir: dest_dir.as_ref().to_path_buf(),
            header: Vec::new(),
            writers: IndexMap::new(),
            dropped: 0,
        }
    }

    /// Handle one line, without its line terminator.
    pub fn push_line(&mut self, line: &str) -> Result<(), std::io::Error> {
        if line.is_empty() {
            return Ok(());
        }
        if line.starts_with('#') {
            self.header.push(line.to_string());
            return Ok(());
        }

        let gene = match gene_of_line(line) {
            Some(gene) if !gene.contains(&['/', '\\'][..]) => gene,
            _ => {
                tracing::trace!("no gene in line, dropping: {}", line);
                self.dropped += 1;
                return Ok(());
            }
        };

        if !self.writers.contains_key(gene) {
            std::fs::create_dir_all(&self.dest_dir)?;
            let path = self.dest_dir.join(format!("{}.vcf", gene));
            tracing::debug!("creating per-gene file {}", path.display());
            let mut writer = BufWriter::new(File::create(&path)?);
            for header_line in &self.header {
                writeln!(writer, "{}", header_line)?;
            }
            self.writers.insert(gene.to_string(), (path, writer));
        }
        if let Some((_, writer)) = self.writers.get_mut(gene) {
            writeln!(writer, "{}", line)?;
        }

        Ok(())
    }

    /// Flush all per-gene files and return them by gene, in order of first occurrence.
    pub fn finish(self) -> Result<IndexMap<String, PathBuf>, std::io::Error> {
        if self.dropped > 0 {
            tracing::warn!(
                "dropped {} lines without gene symbol",
                self.dropped.separate_with_commas()
            );
        }
        let mut result = IndexMap::new();
        for (gene, (path, mut writer)) in self.writers {
            writer.flush()?;
            result.insert(gene, path);
        }
        Ok(result)
    }
}

/// Read all of a child's stderr on a separate thread so it cannot block the pipe.
fn capture_stderr(stderr: Option<ChildStderr>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stderr) = stderr {
            if let Err(e) = stderr.read_to_end(&mut buf) {
                tracing::warn!("could not read stderr of child process: {}", e);
            }
        }
        String::from_utf8_lossy(&buf).trim().to_string()
    })
}

fn kill_quietly(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::debug!("could not kill child process: {}", e);
    }
}

/// Run `annotation | filtration` and demultiplex the output into `dest_dir`.
///
/// The two stages are connected by an OS pipe, so the annotation stage blocks
/// when the filtration stage falls behind.  Returns the per-gene files by gene
/// symbol; the map is empty if no line carried a gene symbol.
pub fn run_pipeline<P: AsRef<Path>>(
    annotation: &Stage,
    filtration: &Stage,
    dest_dir: P,
) -> Result<IndexMap<String, PathBuf>, AnnotationToolError> {
    tracing::debug!("annotation command: {}", annotation);
    tracing::debug!("filtration command: {}", filtration);

    let mut first = annotation
        .command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| AnnotationToolError::Spawn {
            stage: "annotation",
            program: annotation.program.clone(),
            source,
        })?;
    let first_stderr = capture_stderr(first.stderr.take());
    let first_stdout = match first.stdout.take() {
        Some(stdout) => stdout,
        None => {
            kill_quietly(&mut first);
            first.wait()?;
            return Err(AnnotationToolError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "annotation stdout not captured",
            )));
        }
    };

    let mut second = match filtration
        .command()
        .stdin(Stdio::from(first_stdout))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(source) => {
            kill_quietly(&mut first);
            first.wait()?;
            return Err(AnnotationToolError::Spawn {
                stage: "filtration",
                program: filtration.program.clone(),
                source,
            });
        }
    };
    let second_stderr = capture_stderr(second.stderr.take());

    let demux_result = match second.stdout.take() {
        Some(stdout) => demultiplex(BufReader::new(stdout), dest_dir.as_ref()),
        None => Err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "filtration stdout not captured",
        )),
    };
    if demux_result.is_err() {
        kill_quietly(&mut second);
        kill_quietly(&mut first);
    }

    let second_status = second.wait()?;
    let first_status = first.wait()?;
    let first_stderr = first_stderr.join().unwrap_or_default();
    let second_stderr = second_stderr.join().unwrap_or_default();

    let genes = demux_result?;
    // An annotation stage killed by a signal usually died of SIGPIPE after the
    // filtration stage exited, so the filtration failure is the cause.
    let first_signaled = !first_status.success() && first_status.code().is_none();
    if !second_status.success() && (first_status.success() || first_signaled) {
        return Err(AnnotationToolError::Failed {
            stage: "filtration",
            code: second_status.code(),
            stderr: second_stderr,
        });
    }
    if !first_status.success() {
        return Err(AnnotationToolError::Failed {
            stage: "annotation",
            code: first_status.code(),
            stderr: first_stderr,
        });
    }
    if !second_status.success() {
        return Err(AnnotationToolError::Failed {
            stage: "filtration",
            code: second_status.code(),
            stderr: second_stderr,
        });
    }

    tracing::debug!("annotation produced {} per-gene files", genes.len());
    Ok(genes)
}

/// Split the annotated stream from `reader` into per-gene files below `dest_dir`.
pub fn demultiplex<R: BufRead>(
    reader: R,
    dest_dir: &Path,
) -> Result<IndexMap<String, PathBuf>, std::io::Error> {
    let mut demux = GeneDemultiplexer::new(dest_dir);
    for line in reader.lines() {
        demux.push_line(&line?)?;
    }
    demux.finish()
}

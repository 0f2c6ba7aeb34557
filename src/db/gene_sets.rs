//! Gene sets scoping which genes an ingestion extracts.

use rusqlite::{params, OptionalExtension};

use crate::{
    db::{model::GeneSet, Store},
    err::StorageError,
};

impl Store {
    /// Create a gene set; member order is kept, duplicates are dropped.
    pub fn create_gene_set(&self, gene_set: &GeneSet) -> Result<(), StorageError> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO gene_sets (name, description) VALUES (?1, ?2)",
                params![&gene_set.name, &gene_set.description],
            )?;
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO gene_set_members (gene_set, position, gene_hgnc) \
                 VALUES (?1, ?2, ?3)",
            )?;
            for (position, gene) in gene_set.genes.iter().enumerate() {
                stmt.execute(params![&gene_set.name, position as i64, gene])?;
            }
            Ok(())
        })
    }

    /// Look up a gene set by name.
    pub fn get_gene_set(&self, name: &str) -> Result<Option<GeneSet>, StorageError> {
        self.read(|conn| {
            let description = conn
                .query_row(
                    "SELECT description FROM gene_sets WHERE name = ?1",
                    [name],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()?;
            let description = match description {
                Some(description) => description,
                None => return Ok(None),
            };
            let mut stmt = conn.prepare(
                "SELECT gene_hgnc FROM gene_set_members WHERE gene_set = ?1 ORDER BY position ASC",
            )?;
            let genes = stmt
                .query_map([name], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(Some(GeneSet {
                name: name.to_string(),
                description,
                genes,
            }))
        })
    }

    /// Names of all gene sets.
    pub fn get_gene_set_names(&self) -> Result<Vec<String>, StorageError> {
        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM gene_sets ORDER BY name ASC")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }

    /// Delete a gene set; returns `false` if there is no such set.
    pub fn delete_gene_set(&self, name: &str) -> Result<bool, StorageError> {
        self.write(|tx| {
            tx.execute("DELETE FROM gene_set_members WHERE gene_set = ?1", [name])?;
            let deleted = tx.execute("DELETE FROM gene_sets WHERE name = ?1", [name])?;
            Ok(deleted > 0)
        })
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::db::{model::GeneSet, test::open_store};

    #[test]
    fn gene_set_lifecycle() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = open_store(&tmp_dir);
        let panel = GeneSet {
            name: "xq28".into(),
            description: Some("PAR2 genes".into()),
            genes: vec!["VAMP7".into(), "IL9R".into(), "SPRY3".into()],
        };

        assert_eq!(store.get_gene_set("xq28")?, None);
        store.create_gene_set(&panel)?;
        assert!(store.create_gene_set(&panel).is_err());

        assert_eq!(store.get_gene_set("xq28")?, Some(panel));
        assert_eq!(store.get_gene_set_names()?, vec!["xq28"]);

        assert!(store.delete_gene_set("xq28")?);
        assert!(!store.delete_gene_set("xq28")?);
        assert_eq!(store.get_gene_set("xq28")?, None);

        Ok(())
    }

    #[test]
    fn duplicate_members_are_dropped() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = open_store(&tmp_dir);

        store.create_gene_set(&GeneSet {
            name: "dups".into(),
            description: None,
            genes: vec!["IL9R".into(), "IL9R".into(), "VAMP7".into()],
        })?;

        assert_eq!(
            store.get_gene_set("dups")?.map(|set| set.genes),
            Some(vec!["IL9R".to_string(), "VAMP7".to_string()])
        );

        Ok(())
    }
}

use jgi_query::catalog::{Catalog, CategoryMode};
use jgi_query::manifest::Manifest;

const MANIFEST: &str = r#"<organismDownloads name="Org1">
  <folder name="Files">
    <folder name="Transcripts">
      <file filename="t2.fa.gz" url="/Org1/t2.fa.gz" sizeInBytes="10"/>
      <file filename="t1.fa.gz" url="/Org1/t1.fa.gz" sizeInBytes="10"/>
    </folder>
    <folder name="Genes">
      <folder name="GFF">
        <file filename="b.gff.gz" url="/Org1/b.gff.gz" sizeInBytes="10"/>
      </folder>
      <file filename="a.gff.gz" url="/Org1/a.gff.gz" sizeInBytes="10"/>
    </folder>
  </folder>
  <folder name="Filtered Models">
    <folder name="Genes">
      <file filename="c.gff.gz" url="/Org1/c.gff.gz" sizeInBytes="10"/>
    </folder>
  </folder>
</organismDownloads>
"#;

fn manifest() -> Manifest {
    Manifest::parse(MANIFEST, "test").unwrap()
}

fn assert_well_numbered(catalog: &Catalog) {
    for (position, category) in catalog.categories().iter().enumerate() {
        assert_eq!(category.id as usize, position + 1);
        let entries = catalog.category_entries(category);
        let indices: Vec<u32> = entries.iter().map(|entry| entry.index).collect();
        let expected: Vec<u32> = (1..=entries.len() as u32).collect();
        assert_eq!(indices, expected, "category {}", category.name);

        let mut by_group_then_name: Vec<_> = entries
            .iter()
            .map(|entry| (entry.group_name.clone(), entry.filename.clone()))
            .collect();
        by_group_then_name.sort();
        let in_index_order: Vec<_> = entries
            .iter()
            .map(|entry| (entry.group_name.clone(), entry.filename.clone()))
            .collect();
        assert_eq!(in_index_order, by_group_then_name);
    }
    let names: Vec<&str> = catalog
        .categories()
        .iter()
        .map(|category| category.name.as_str())
        .collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[test]
fn named_categories_are_numbered_contiguously() {
    let mode = CategoryMode::Named(vec![
        "Transcripts".to_string(),
        "Proteins".to_string(),
        "Genes".to_string(),
    ]);
    let catalog = Catalog::extract(manifest().root(), &mode);
    assert_well_numbered(&catalog);

    let names: Vec<_> = catalog
        .categories()
        .iter()
        .map(|category| (category.id, category.name.as_str()))
        .collect();
    assert_eq!(names, vec![(1, "Genes"), (2, "Transcripts")]);

    let genes: Vec<_> = catalog
        .category_entries(catalog.category(1).unwrap())
        .iter()
        .map(|entry| (entry.group_name.as_str(), entry.filename.as_str()))
        .collect();
    assert_eq!(
        genes,
        vec![
            ("Files", "a.gff.gz"),
            ("Filtered Models", "c.gff.gz"),
            ("GFF", "b.gff.gz"),
        ]
    );
}

#[test]
fn all_mode_covers_every_file() {
    let manifest = manifest();
    let catalog = Catalog::extract(manifest.root(), &CategoryMode::All);
    assert_well_numbered(&catalog);
    assert_eq!(catalog.entries().len(), manifest.file_count());
}

#[test]
fn no_match_yields_empty_catalog() {
    let mode = CategoryMode::Named(vec!["ESTs".to_string()]);
    let catalog = Catalog::extract(manifest().root(), &mode);
    assert!(catalog.is_empty());
    assert!(catalog.categories().is_empty());
}

const NESTED_MANIFEST: &str = r#"<organismDownloads name="Org2">
  <folder name="Genes">
    <folder name="v1">
      <file filename="same.gz" url="/Org2/v1/same.gz" sizeInBytes="10"/>
    </folder>
    <folder name="v2">
      <file filename="same.gz" url="/Org2/v2/same.gz" sizeInBytes="10"/>
    </folder>
    <folder name="Genes">
      <file filename="inner.gz" url="/Org2/inner.gz" sizeInBytes="10"/>
    </folder>
  </folder>
</organismDownloads>
"#;

fn genes_only() -> CategoryMode {
    CategoryMode::Named(vec!["Genes".to_string()])
}

#[test]
fn duplicate_filenames_get_distinct_indices() {
    let manifest = Manifest::parse(NESTED_MANIFEST, "test").unwrap();
    let catalog = Catalog::extract(manifest.root(), &genes_only());
    assert_well_numbered(&catalog);

    let same: Vec<_> = catalog
        .entries()
        .iter()
        .filter(|entry| entry.filename == "same.gz")
        .map(|entry| (entry.index, entry.group_name.as_str(), entry.url.as_str()))
        .collect();
    assert_eq!(
        same,
        vec![(2, "v1", "/Org2/v1/same.gz"), (3, "v2", "/Org2/v2/same.gz")]
    );
}

#[test]
fn nested_same_name_folder_is_counted_once() {
    let manifest = Manifest::parse(NESTED_MANIFEST, "test").unwrap();
    let catalog = Catalog::extract(manifest.root(), &genes_only());
    assert_well_numbered(&catalog);
    assert_eq!(catalog.categories().len(), 1);
    assert_eq!(catalog.entries().len(), manifest.file_count());

    let inner: Vec<_> = catalog
        .entries()
        .iter()
        .filter(|entry| entry.filename == "inner.gz")
        .map(|entry| (entry.index, entry.group_name.as_str()))
        .collect();
    assert_eq!(inner, vec![(1, "Genes")]);
}

#[test]
fn document_element_can_be_the_category() {
    let text = r#"<organismDownloads name="Genes">
      <file filename="top.gz" url="/Genes/top.gz" sizeInBytes="10"/>
      <folder name="GFF">
        <file filename="g.gff.gz" url="/Genes/g.gff.gz" sizeInBytes="10"/>
      </folder>
    </organismDownloads>"#;
    let manifest = Manifest::parse(text, "test").unwrap();
    let catalog = Catalog::extract(manifest.root(), &genes_only());
    assert_well_numbered(&catalog);

    let entries: Vec<_> = catalog
        .entries()
        .iter()
        .map(|entry| (entry.group_name.as_str(), entry.filename.as_str()))
        .collect();
    assert_eq!(entries, vec![("GFF", "g.gff.gz"), ("Genes", "top.gz")]);
}

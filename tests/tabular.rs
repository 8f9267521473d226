use std::io::Cursor;

use camino::Utf8PathBuf;

use biodatagraph::config::default_pipeline;
use biodatagraph::parser::RunParams;
use biodatagraph::tabular::TabularParser;

const GENE_INFO: &str = "#tax_id\tGeneID\tSymbol\tLocusTag\tSynonyms\tdbXrefs\tchromosome\tmap_location\tdescription\ttype_of_gene\n\
9606\t7157\tTP53\t-\tBCC7|LFS1|TRP53\tMIM:191170\t17\t17p13.1\ttumor protein p53\tprotein-coding\n\
9606\t1\tA1BG\t-\tA1B|ABG|GAB\tMIM:138670\t19\t19q13.43\talpha-1-B glycoprotein\tprotein-coding\n\
9606\t100\tADA\t-\t-\tMIM:608958\t20\t20q13.12\tadenosine deaminase\tprotein-coding\n\
10090\t22059\tTrp53\t-\tTp53\tMGI:98834\t11\t11 B3\ttransformation related protein 53\tprotein-coding\n";

fn gene_parser() -> TabularParser {
    let entry = default_pipeline()
        .parsers
        .into_iter()
        .find(|parser| parser.name == "ncbigene")
        .unwrap();
    TabularParser::new(entry.name, entry.datasource, entry.layout)
}

fn params(taxid: Option<&str>) -> RunParams {
    RunParams {
        root: Utf8PathBuf::from("/unused"),
        taxid: taxid.map(|value| value.parse().unwrap()),
    }
}

#[test]
fn gene_info_maps_genes_synonyms_and_links() {
    let container = gene_parser()
        .parse_reader(Cursor::new(GENE_INFO), "gene_info", &params(Some("9606")))
        .unwrap();

    let genes = &container.node_sets()[0];
    assert_eq!(genes.label().as_str(), "Gene");
    assert_eq!(genes.len(), 3);
    let tp53 = &genes.nodes()[0];
    assert_eq!(tp53["sid"], "7157");
    assert_eq!(tp53["symbol"], "TP53");
    assert_eq!(tp53["chromosome"], "17");
    assert_eq!(tp53["type_of_gene"], "protein-coding");

    let symbols = &container.node_sets()[1];
    assert_eq!(symbols.label().as_str(), "GeneSymbol");
    assert_eq!(symbols.len(), 6);

    let links = &container.relationship_sets()[0];
    assert_eq!(links.rel_type().as_str(), "HAS_SYNONYM");
    assert_eq!(links.len(), 6);
    assert_eq!(links.to_string(), "(Gene)-[HAS_SYNONYM]->(GeneSymbol)");
}

#[test]
fn without_taxid_every_organism_is_kept() {
    let container = gene_parser()
        .parse_reader(Cursor::new(GENE_INFO), "gene_info", &params(None))
        .unwrap();
    assert_eq!(container.node_sets()[0].len(), 4);
}

#[test]
fn gzip_release_is_decompressed() {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("gene_info.gz")).unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(GENE_INFO.as_bytes()).unwrap();
    std::fs::write(&path, encoder.finish().unwrap()).unwrap();

    let container = gene_parser()
        .parse_file(&path, &params(Some("9606")))
        .unwrap();
    assert_eq!(container.node_sets()[0].len(), 3);
}

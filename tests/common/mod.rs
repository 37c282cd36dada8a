#![allow(dead_code)]

use robinhood_analyzer::Config;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const PROPERTIES: &str = "\
Provincia;Comune;Indirizzo;Tipologia;Categoria catastale;Metri quadri/Consistenza;Finalità;Destinatario
TARANTO;Lizzano;Via Roma 1;Appartamento;A/2;120;Sociale;Comune di Lizzano
TARANTO;LIZZANO ;Via Po 3;Box;C/6;18;;
TARANTO;Ginosa;Contrada Girifalco;Terreno agricolo;T;5000;;
TARANTO;Ginosa;Via Mare 2;Villa;A/7;210;;
TARANTO;Ginosa;Via Mare 4;Negozio;C/1;40;;
TARANTO;Taranto;Via Duomo 10;Appartamento;A/3;70;;
TARANTO;Taranto;riga;rotta
BARI;Bari;Via Sparano 5;Negozio;C/1;60;;
";

pub const SERVICES: &str = "\
COMUNE,DENOMINAZIONE,TIPOLOGIA
LIZZANO,Centro diurno,Disabili
Taranto,RSA Santa Rita,Anziani
TARANTO,Centro anziani,Anziani
TARANTO,Casa di riposo,Anziani
MASSAFRA,Centro sociale,Anziani
";

pub struct TestEnv {
    _tmp: TempDir,
    pub root: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let root = tmp.path().to_path_buf();
        fs::write(root.join("beni.csv"), PROPERTIES).expect("write properties");
        fs::write(root.join("servizi.csv"), SERVICES).expect("write services");
        Self { _tmp: tmp, root }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn config(&self) -> Config {
        Config {
            services_source: path_str(&self.path("servizi.csv")),
            properties_source: path_str(&self.path("beni.csv")),
            output_directory: Some(path_str(&self.path("output"))),
            ..Config::default()
        }
    }

    /// The well-formed rows of `PROPERTIES` as a workbook; sizes are numeric cells.
    pub fn write_properties_workbook(&self, name: &str) -> PathBuf {
        let path = self.path(name);
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        let mut lines = PROPERTIES.lines();
        let headers: Vec<&str> = lines.next().expect("header").split(';').collect();
        let rows = lines
            .map(|line| line.split(';').collect::<Vec<_>>())
            .filter(|fields| fields.len() == headers.len());

        for (col, header) in headers.iter().enumerate() {
            sheet.write_string(0, col as u16, *header).expect("write header");
        }
        for (i, fields) in rows.enumerate() {
            for (col, field) in fields.iter().enumerate() {
                let row = i as u32 + 1;
                match field.parse::<f64>() {
                    Ok(number) => sheet.write_number(row, col as u16, number),
                    Err(_) => sheet.write_string(row, col as u16, *field),
                }
                .expect("write cell");
            }
        }
        workbook.save(&path).expect("save workbook");
        path
    }

    pub fn write_config(&self, config: &Config) -> PathBuf {
        let path = self.path("config.toml");
        config.save_to_file(&path).expect("write config");
        path
    }
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

//! XML parsers for Bus Tracker and Train Tracker prediction responses.
//!
//! Both APIs answer with a small XML document. Only the arrival timestamp of
//! each prediction is kept; everything else in the document is ignored.

use quick_xml::Reader;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ParseError;
use crate::registry::Mode;

/// Raw predicted-arrival timestamps from one fetch, in document order.
///
/// Timestamps stay unparsed here; [`crate::eta::compute_etas`] parses them so
/// a single bad record only drops that record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionBatch {
    pub mode: Mode,
    pub arrivals: Vec<String>,
}

impl PredictionBatch {
    pub fn empty(mode: Mode) -> Self {
        Self {
            mode,
            arrivals: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.arrivals.is_empty()
    }
}

// <bustime-response><prd>..</prd><error>..</error></bustime-response>
#[derive(Debug, Deserialize)]
struct BusTimeResponse {
    #[serde(rename = "prd", default)]
    predictions: Vec<BusPrediction>,
    #[serde(rename = "error", default)]
    errors: Vec<BusError>,
}

#[derive(Debug, Deserialize)]
struct BusPrediction {
    #[serde(default)]
    prdtm: String,
}

#[derive(Debug, Deserialize)]
struct BusError {
    #[serde(default)]
    msg: String,
}

// <ctatt><errCd>0</errCd><errNm/><eta>..</eta></ctatt>
#[derive(Debug, Deserialize)]
struct TrainTrackerResponse {
    #[serde(rename = "errCd", default)]
    err_cd: String,
    #[serde(rename = "errNm", default)]
    err_nm: String,
    #[serde(rename = "eta", default)]
    etas: Vec<TrainEta>,
}

#[derive(Debug, Deserialize)]
struct TrainEta {
    #[serde(rename = "arrT", default)]
    arr_t: String,
}

const BUS_ROOT: &str = "bustime-response";
const RAIL_ROOT: &str = "ctatt";

/// Fails unless the first element of `body` is `<expected>`.
///
/// The deserializer ignores the root name, so a gateway's HTML error page
/// would otherwise read as a document with no predictions.
fn expect_root(body: &str, expected: &'static str) -> Result<(), ParseError> {
    let mut reader = Reader::from_str(body);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let found = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if found == expected {
                    return Ok(());
                }
                return Err(ParseError::UnexpectedRoot { expected, found });
            }
            Ok(Event::Eof) => return Err(ParseError::Xml("empty document".to_string())),
            Ok(_) => {}
            Err(e) => return Err(ParseError::Xml(e.to_string())),
        }
    }
}

/// Parses a `getpredictions` document.
///
/// `<error>` entries such as "No service scheduled" mean no predictions, not a
/// failure.
pub fn parse_bus_response(body: &str) -> Result<PredictionBatch, ParseError> {
    expect_root(body, BUS_ROOT)?;
    let doc: BusTimeResponse = from_str(body).map_err(|e| ParseError::Xml(e.to_string()))?;

    for err in &doc.errors {
        debug!(message = %err.msg, "Bus Tracker reported no predictions");
    }

    Ok(PredictionBatch {
        mode: Mode::Bus,
        arrivals: doc.predictions.into_iter().map(|p| p.prdtm).collect(),
    })
}

/// Parses a `ttarrivals` document.
///
/// A non-zero `errCd` is logged and treated as no predictions.
pub fn parse_rail_response(body: &str) -> Result<PredictionBatch, ParseError> {
    expect_root(body, RAIL_ROOT)?;
    let doc: TrainTrackerResponse = from_str(body).map_err(|e| ParseError::Xml(e.to_string()))?;

    let code = doc.err_cd.trim();
    if !code.is_empty() && code != "0" {
        warn!(code, message = %doc.err_nm.trim(), "Train Tracker returned an error");
        return Ok(PredictionBatch::empty(Mode::Rail));
    }

    Ok(PredictionBatch {
        mode: Mode::Rail,
        arrivals: doc.etas.into_iter().map(|e| e.arr_t).collect(),
    })
}

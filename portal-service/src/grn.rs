use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use shared::*;
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrnState {
    NoReference,
    ReferenceSelected,
    CartonInProgress,
    CartonLocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanOutcome {
    Added { scanned: usize },
    CartonLocked { carton: Carton },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrnSessionView {
    pub id: Uuid,
    pub state: GrnState,
    pub reference: Option<GrnReference>,
    pub current_pairs: Vec<String>,
    pub cartons: Vec<Carton>,
    pub can_submit: bool,
    pub opened_at: DateTime<Utc>,
}

/// One goods-receipt scanning session. Pairs are packed into cartons of
/// exactly 24 and no pair code may appear twice anywhere in the session.
#[derive(Debug, Clone)]
pub struct GrnSession {
    id: Uuid,
    reference: Option<GrnReference>,
    current: Vec<String>,
    cartons: Vec<Carton>,
    seen: HashSet<String>,
    next_serial: u32,
    opened_at: DateTime<Utc>,
}

impl GrnSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            reference: None,
            current: Vec::new(),
            cartons: Vec::new(),
            seen: HashSet::new(),
            next_serial: 1,
            opened_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn reference(&self) -> Option<&GrnReference> {
        self.reference.as_ref()
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn cartons(&self) -> &[Carton] {
        &self.cartons
    }

    pub fn state(&self) -> GrnState {
        if self.reference.is_none() {
            GrnState::NoReference
        } else if !self.current.is_empty() {
            GrnState::CartonInProgress
        } else if !self.cartons.is_empty() {
            GrnState::CartonLocked
        } else {
            GrnState::ReferenceSelected
        }
    }

    pub fn select_reference(&mut self, reference: GrnReference) -> Result<(), ScanError> {
        let started = !self.current.is_empty() || !self.cartons.is_empty();
        if started && self.reference.as_ref() != Some(&reference) {
            return Err(ScanError::ReferenceLocked);
        }
        self.reference = Some(reference);
        Ok(())
    }

    pub fn scan(&mut self, code: &str) -> Result<ScanOutcome, ScanError> {
        self.scan_on(code, Utc::now().date_naive())
    }

    pub fn scan_on(&mut self, code: &str, today: NaiveDate) -> Result<ScanOutcome, ScanError> {
        let Some(reference) = self.reference.as_ref() else {
            return Err(ScanError::NoReference);
        };
        let code = code.trim();
        if code.is_empty() {
            return Err(ScanError::EmptyCode);
        }
        if self.current.iter().any(|pair| pair == code) {
            return Err(ScanError::DuplicateInCarton(code.to_string()));
        }
        if self.seen.contains(code) {
            return Err(ScanError::DuplicateInSession(code.to_string()));
        }

        self.seen.insert(code.to_string());
        self.current.push(code.to_string());

        if self.current.len() < PAIRS_PER_CARTON as usize {
            debug!("Session {} scanned {} ({}/24)", self.id, code, self.current.len());
            return Ok(ScanOutcome::Added {
                scanned: self.current.len(),
            });
        }

        let barcode = format!(
            "{}-{}-{}-{:04}",
            reference.kind_code(),
            reference.number(),
            today.format("%Y%m%d"),
            self.next_serial
        );
        self.next_serial += 1;
        let carton = Carton {
            barcode,
            pair_codes: std::mem::take(&mut self.current),
        };
        info!("Session {} locked carton {}", self.id, carton.barcode);
        self.cartons.push(carton.clone());
        Ok(ScanOutcome::CartonLocked { carton })
    }

    /// Throws away the partially scanned carton so its pairs can be scanned again.
    pub fn rescan_carton(&mut self) -> usize {
        let released = self.current.len();
        for code in self.current.drain(..) {
            self.seen.remove(&code);
        }
        released
    }

    pub fn remove_carton(&mut self, barcode: &str, confirmed: bool) -> Result<Carton, ScanError> {
        let index = self
            .cartons
            .iter()
            .position(|carton| carton.barcode == barcode)
            .ok_or_else(|| ScanError::CartonNotFound(barcode.to_string()))?;
        if !confirmed {
            return Err(ScanError::RemovalNotConfirmed(barcode.to_string()));
        }
        let carton = self.cartons.remove(index);
        for code in &carton.pair_codes {
            self.seen.remove(code);
        }
        info!("Session {} removed carton {}", self.id, carton.barcode);
        Ok(carton)
    }

    pub fn can_submit(&self) -> bool {
        !self.cartons.is_empty() && self.current.is_empty()
    }

    /// One stock entry per locked carton.
    pub fn submit(&self) -> Result<Vec<StockEntry>, ScanError> {
        let reference = self.reference.as_ref().ok_or(ScanError::NoReference)?;
        if !self.can_submit() {
            return Err(ScanError::NotReadyToSubmit);
        }
        Ok(self
            .cartons
            .iter()
            .map(|carton| StockEntry::from_carton(carton, reference))
            .collect())
    }

    pub fn view(&self) -> GrnSessionView {
        GrnSessionView {
            id: self.id,
            state: self.state(),
            reference: self.reference.clone(),
            current_pairs: self.current.clone(),
            cartons: self.cartons.clone(),
            can_submit: self.can_submit(),
            opened_at: self.opened_at,
        }
    }
}

impl Default for GrnSession {
    fn default() -> Self {
        Self::new()
    }
}

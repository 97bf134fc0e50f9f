use crate::types::{AgentOutput, Stage};

/// Ordered, stage-keyed collection of outputs for one task submission.
///
/// Iteration order is a function of the stage only: ranked stages ascending,
/// then unranked stages in arrival order, then the `error` entry. The store
/// holds no lock; the controller owns it and serializes access.
#[derive(Debug, Default)]
pub struct OutputStore {
    epoch: u64,
    entries: Vec<AgentOutput>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current epoch. Advanced by every `reset`.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Insert or replace the entry for `output.stage`.
    pub fn upsert(&mut self, output: AgentOutput) {
        match self.entries.iter_mut().find(|e| e.stage == output.stage) {
            Some(existing) => *existing = output,
            None => self.entries.push(output),
        }
        // Stable: unranked stages keep their arrival order within a bucket.
        self.entries.sort_by_key(|e| e.stage.order_bucket());
    }

    /// Upsert only if `epoch` is still current. Returns whether it applied.
    pub fn upsert_at(&mut self, epoch: u64, output: AgentOutput) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.upsert(output);
        true
    }

    /// Drop every entry and start a new epoch.
    pub fn reset(&mut self) -> u64 {
        self.entries.clear();
        self.epoch += 1;
        self.epoch
    }

    pub fn snapshot(&self) -> Vec<AgentOutput> {
        self.entries.clone()
    }

    pub fn get(&self, stage: &Stage) -> Option<&AgentOutput> {
        self.entries.iter().find(|e| &e.stage == stage)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OutputKind;

    fn output(stage: Stage, content: &str) -> AgentOutput {
        let kind = match stage {
            Stage::Researcher => OutputKind::ResearchData,
            Stage::Analyst => OutputKind::Analysis,
            Stage::ReportWriter => OutputKind::Report,
            Stage::Error => OutputKind::Error,
            Stage::Other(_) => OutputKind::Raw,
        };
        AgentOutput::new(stage, kind, content)
    }

    fn stages(store: &OutputStore) -> Vec<Stage> {
        store.snapshot().into_iter().map(|o| o.stage).collect()
    }

    #[test]
    fn snapshot_order_ignores_arrival_order() {
        let mut store = OutputStore::new();
        store.upsert(output(Stage::Error, "oops"));
        store.upsert(output(Stage::ReportWriter, "report"));
        store.upsert(output(Stage::Researcher, "notes"));
        assert_eq!(
            stages(&store),
            vec![Stage::Researcher, Stage::ReportWriter, Stage::Error]
        );

        store.upsert(output(Stage::Analyst, "analysis"));
        assert_eq!(
            stages(&store),
            vec![
                Stage::Researcher,
                Stage::Analyst,
                Stage::ReportWriter,
                Stage::Error
            ]
        );
    }

    #[test]
    fn upsert_replaces_in_place_and_is_idempotent() {
        let mut store = OutputStore::new();
        store.upsert(output(Stage::Researcher, "v1"));
        store.upsert(output(Stage::Analyst, "a"));
        store.upsert(output(Stage::Researcher, "v2"));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&Stage::Researcher).unwrap().content, "v2");

        let before = store.snapshot();
        store.upsert(output(Stage::Analyst, "a"));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn unranked_stages_sit_between_ranked_and_error() {
        let mut store = OutputStore::new();
        store.upsert(output(Stage::Error, "e"));
        store.upsert(output(Stage::from_name("zeta"), "z"));
        store.upsert(output(Stage::Analyst, "a"));
        store.upsert(output(Stage::from_name("alpha"), "x"));
        assert_eq!(
            stages(&store),
            vec![
                Stage::Analyst,
                Stage::Other("zeta".to_string()),
                Stage::Other("alpha".to_string()),
                Stage::Error
            ]
        );
    }

    #[test]
    fn reset_clears_and_fences_stale_writes() {
        let mut store = OutputStore::new();
        let first = store.reset();
        assert!(store.upsert_at(first, output(Stage::Researcher, "old")));

        let second = store.reset();
        assert!(second > first);
        assert!(store.is_empty());
        assert!(!store.upsert_at(first, output(Stage::Analyst, "stale")));
        assert!(store.is_empty());
        assert!(store.upsert_at(second, output(Stage::Analyst, "fresh")));
        assert_eq!(stages(&store), vec![Stage::Analyst]);
    }
}

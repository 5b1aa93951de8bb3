use std::sync::atomic::{AtomicBool, Ordering};

use super::schedule::Schedule;

/// Index of a job slot in a [`JobRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(usize);

#[derive(Debug)]
struct JobSlot {
    name: &'static str,
    schedule: Schedule,
    in_flight: AtomicBool,
}

/// Fixed arena of periodic jobs. Each slot carries an in-flight flag so a
/// job never overlaps itself, whether fired by its timer or run by hand.
#[derive(Debug, Default)]
pub struct JobRegistry {
    slots: Vec<JobSlot>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, schedule: Schedule) -> JobId {
        self.slots.push(JobSlot {
            name,
            schedule,
            in_flight: AtomicBool::new(false),
        });
        JobId(self.slots.len() - 1)
    }

    pub fn ids(&self) -> impl Iterator<Item = JobId> + '_ {
        (0..self.slots.len()).map(JobId)
    }

    pub fn find(&self, name: &str) -> Option<JobId> {
        self.slots.iter().position(|s| s.name == name).map(JobId)
    }

    pub fn name(&self, id: JobId) -> &'static str {
        self.slots[id.0].name
    }

    pub fn schedule(&self, id: JobId) -> Schedule {
        self.slots[id.0].schedule
    }

    pub fn is_running(&self, id: JobId) -> bool {
        self.slots[id.0].in_flight.load(Ordering::Acquire)
    }

    /// Marks the job in flight. `None` if it already is.
    pub fn try_begin(&self, id: JobId) -> Option<RunGuard<'_>> {
        let flag = &self.slots[id.0].in_flight;
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard { flag })
    }
}

/// Clears the in-flight flag on drop, including on panic unwind.
#[derive(Debug)]
pub struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_running_job_cannot_begin_again() {
        let mut registry = JobRegistry::new();
        let triage = registry.register("triage", Schedule::EveryHours { hours: 4 });
        let audit = registry.register("audit", Schedule::EveryHours { hours: 6 });

        let guard = registry.try_begin(triage).unwrap();
        assert!(registry.is_running(triage));
        assert!(registry.try_begin(triage).is_none());
        assert!(registry.try_begin(audit).is_some());

        drop(guard);
        assert!(!registry.is_running(triage));
        assert!(registry.try_begin(triage).is_some());
    }

    #[test]
    fn jobs_are_found_by_name() {
        let mut registry = JobRegistry::new();
        let id = registry.register("retention", Schedule::Daily { hour: 3 });
        assert_eq!(registry.find("retention"), Some(id));
        assert_eq!(registry.find("missing"), None);
        assert_eq!(registry.name(id), "retention");
    }
}

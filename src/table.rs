use crate::job::{Job, JobId, JobSpec, StaticIo};

/// All jobs known to the supervisor, addressed by their stable id.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
    viable: usize,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next registered job will get.
    pub fn next_id(&self) -> JobId {
        self.jobs.len() + 1
    }

    /// Registers a job under the next id. Jobs that cannot run still take one.
    pub fn register(&mut self, spec: JobSpec, io: StaticIo, runnable: bool) -> JobId {
        debug_assert_eq!(spec.id, self.next_id());
        let id = spec.id;
        self.jobs.push(Job::new(spec, io, runnable));
        id
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        id.checked_sub(1).and_then(|idx| self.jobs.get(idx))
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        id.checked_sub(1).and_then(move |idx| self.jobs.get_mut(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Job> {
        self.jobs.iter_mut()
    }

    /// Jobs that failed to load or to open their redirects.
    pub fn invalid(&self) -> usize {
        self.jobs.iter().filter(|job| !job.runnable && job.runs == 0).count()
    }

    /// Number of jobs with a live process.
    pub const fn viable(&self) -> usize {
        self.viable
    }

    pub fn worker_started(&mut self) {
        self.viable += 1;
    }

    pub fn worker_lost(&mut self) {
        self.viable = self.viable.saturating_sub(1);
    }

    pub fn all_ended(&self) -> bool {
        self.jobs.iter().all(Job::is_ended)
    }
}

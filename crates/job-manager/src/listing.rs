use protocol::{JobSnapshot, JobStatus};

/// Registry contents captured at `JobManager::list` time, in creation order.
///
/// Iteration is lazy (the status filter applies as items are pulled) and
/// restartable: each `iter()` call starts from the first job again.
#[derive(Debug, Clone)]
pub struct JobListing {
    jobs: Vec<JobSnapshot>,
    filter: Option<JobStatus>,
}

impl JobListing {
    pub(crate) fn new(jobs: Vec<JobSnapshot>, filter: Option<JobStatus>) -> Self {
        Self { jobs, filter }
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.jobs.iter(),
            filter: self.filter,
        }
    }
}

impl<'a> IntoIterator for &'a JobListing {
    type Item = &'a JobSnapshot;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct Iter<'a> {
    inner: std::slice::Iter<'a, JobSnapshot>,
    filter: Option<JobStatus>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a JobSnapshot;

    fn next(&mut self) -> Option<Self::Item> {
        let filter = self.filter;
        self.inner
            .by_ref()
            .find(|job| filter.map_or(true, |status| job.status == status))
    }
}

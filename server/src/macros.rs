macro_rules! clone_params {
  ($($param:tt),*) => {
    ($($param.clone()),*)
  };
}

// Registers a cron-driven async job on the scheduler; the given params are
// cloned into each run.
macro_rules! schedule_job {
  ($scheduler:ident, $job_name:expr, $job_schedule:expr, $job_fn:expr, $($params:tt),*) => {
    {
      use tokio_cron_scheduler::Job;

      tracing::info!("Scheduling job {} with cron '{}'", $job_name, $job_schedule);
      let $($params),* = clone_params!($($params),*);
      $scheduler
        .add(Job::new_async(
          $job_schedule,
          move |uuid, mut l: JobScheduler| {
            let $($params),* = clone_params!($($params),*);
            Box::pin(async move {
              if let Ok(Some(ts)) = l.next_tick_for_job(uuid).await {
                tracing::debug!("Next run of {} at {:?}", $job_name, ts);
              }

              match $job_fn($($params),*).await {
                Ok(_) => {
                  tracing::info!("Job {} ({}) succeeded", $job_name, uuid);
                }
                Err(e) => {
                  tracing::error!("Job {} ({}) failed: {:?}", $job_name, stringify!($job_fn), e);
                }
              }
            })
          },
        )?)
        .await?;
    }
  };
}

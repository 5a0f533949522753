use crate::model::filter::FilterMode;
use crate::model::task::Task;

/// Order-preserving view of `tasks` for `mode`. Never mutates its input.
pub fn project(tasks: &[Task], mode: FilterMode) -> Vec<&Task> {
    tasks.iter().filter(|t| mode.matches(t)).collect()
}

/// Number of tasks that are not completed
pub fn count_active(tasks: &[Task]) -> usize {
    tasks.iter().filter(|t| t.is_active()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::TaskId;
    use pretty_assertions::assert_eq;

    fn task(id: u64, completed: bool) -> Task {
        Task {
            id: TaskId(id),
            text: format!("task {}", id),
            completed,
        }
    }

    fn ids(view: &[&Task]) -> Vec<u64> {
        view.iter().map(|t| t.id.get()).collect()
    }

    #[test]
    fn projects_by_completion_state() {
        let tasks = vec![task(1, false), task(2, true), task(3, false)];

        assert_eq!(ids(&project(&tasks, FilterMode::Active)), vec![1, 3]);
        assert_eq!(ids(&project(&tasks, FilterMode::Completed)), vec![2]);
        assert_eq!(ids(&project(&tasks, FilterMode::All)), vec![1, 2, 3]);
    }

    #[test]
    fn projection_is_idempotent() {
        let tasks = vec![task(4, true), task(1, false), task(9, true)];
        for mode in [FilterMode::All, FilterMode::Active, FilterMode::Completed] {
            assert_eq!(ids(&project(&tasks, mode)), ids(&project(&tasks, mode)));
        }
    }

    #[test]
    fn empty_list_projects_empty() {
        assert!(project(&[], FilterMode::All).is_empty());
        assert_eq!(count_active(&[]), 0);
    }

    #[test]
    fn counts_active() {
        let tasks = vec![task(1, false), task(2, true), task(3, false)];
        assert_eq!(count_active(&tasks), 2);
    }
}

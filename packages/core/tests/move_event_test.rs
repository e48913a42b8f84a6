//! Move Event Tests
//!
//! Every successful move broadcasts exactly one `MovedEvent` after its
//! transaction commits; failed moves broadcast nothing.

mod common;

#[cfg(test)]
mod move_event_tests {
    use crate::common::{create_node, create_ordered_service};
    use anyhow::Result;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_move_to_new_parent_reports_previous_parent() -> Result<()> {
        let (service, _temp_dir) = create_ordered_service().await?;
        let root = create_node(&service, "Root folder", None).await?;
        let child = create_node(&service, "Child folder", Some(&root)).await?;
        let other = create_node(&service, "Other folder", None).await?;

        let mut rx = service.subscribe_to_moves();
        let returned = service.make_child_of(&child, &other).await?;

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("Event should be emitted within 1 second")
            .expect("Should receive event");

        assert_eq!(event, returned);
        assert_eq!(event.model.key, child.key);
        assert_eq!(event.model.parent_key.as_deref(), Some(other.key.as_str()));
        assert_eq!(event.previous_parent.map(|p| p.key), Some(root.key));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        Ok(())
    }

    #[tokio::test]
    async fn test_moving_a_root_reports_no_previous_parent() -> Result<()> {
        let (service, _temp_dir) = create_ordered_service().await?;
        let root = create_node(&service, "Root folder", None).await?;
        let other = create_node(&service, "Other folder", None).await?;

        let mut rx = service.subscribe_to_moves();
        service.make_child_of(&root, &other).await?;

        let event = rx.recv().await?;
        assert!(event.previous_parent.is_none());
        assert!(event.parent_changed());
        Ok(())
    }

    #[tokio::test]
    async fn test_order_only_move_still_emits() -> Result<()> {
        let (service, _temp_dir) = create_ordered_service().await?;
        let root = create_node(&service, "Root folder", None).await?;
        let first = create_node(&service, "First", Some(&root)).await?;
        let second = create_node(&service, "Second", Some(&root)).await?;

        let mut rx = service.subscribe_to_moves();
        service.make_previous_sibling_of(&second, &first).await?;

        let event = rx.recv().await?;
        assert!(!event.parent_changed());
        assert_eq!(event.previous_parent_key(), Some(root.key.as_str()));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_move_emits_nothing() -> Result<()> {
        let (service, _temp_dir) = create_ordered_service().await?;
        let root = create_node(&service, "Root folder", None).await?;
        let child = create_node(&service, "Child folder", Some(&root)).await?;

        let mut rx = service.subscribe_to_moves();
        assert!(service.make_child_of(&root, &child).await.is_err());
        assert!(service.make_child_of_key(&child, "missing").await.is_err());

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        Ok(())
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_each_move_once() -> Result<()> {
        let (service, _temp_dir) = create_ordered_service().await?;
        let root = create_node(&service, "Root folder", None).await?;
        let child = create_node(&service, "Child folder", Some(&root)).await?;

        let mut first_rx = service.subscribe_to_moves();
        let mut second_rx = service.clone().subscribe_to_moves();

        service.make_root(&child).await?;
        service.make_child_of(&child, &root).await?;

        for rx in [&mut first_rx, &mut second_rx] {
            assert_eq!(rx.recv().await?.previous_parent_key(), Some(root.key.as_str()));
            assert_eq!(rx.recv().await?.previous_parent_key(), None);
            assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        }
        Ok(())
    }
}

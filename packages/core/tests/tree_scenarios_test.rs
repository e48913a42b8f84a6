//! End-to-end tree scenarios against SQLite
//!
//! Covers path/depth derivation, cascades on reparenting, the cycle guard and
//! hierarchy assembly.

mod common;

#[cfg(test)]
mod tree_scenarios_tests {
    use crate::common::{create_node, create_ordered_service, create_unordered_service, refresh};
    use anyhow::Result;
    use serde_json::json;
    use treepath_core::models::TreeNode;
    use treepath_core::operations::flatten_forest;
    use treepath_core::services::TreeError;

    #[tokio::test]
    async fn test_child_path_and_depth() -> Result<()> {
        let (service, _temp_dir) = create_ordered_service().await?;

        let root = create_node(&service, "R", None).await?;
        let child = create_node(&service, "C", Some(&root)).await?;

        assert_eq!(root.path, "");
        assert_eq!(root.depth, 0);
        assert_eq!(child.path, format!("/{}/", root.key));
        assert_eq!(child.depth, 1);

        let stored = refresh(&service, &child).await?;
        assert_eq!(stored.path, child.path);
        Ok(())
    }

    #[tokio::test]
    async fn test_reparent_cascades_to_grandchildren() -> Result<()> {
        let (service, _temp_dir) = create_ordered_service().await?;

        let root = create_node(&service, "R", None).await?;
        let child = create_node(&service, "C", Some(&root)).await?;
        let grandchild = create_node(&service, "G", Some(&child)).await?;
        let new_root = create_node(&service, "N2", None).await?;

        service.make_child_of(&child, &new_root).await?;

        let grandchild = refresh(&service, &grandchild).await?;
        assert_eq!(
            grandchild.path,
            format!("/{}/{}/", new_root.key, child.key)
        );
        assert_eq!(grandchild.depth, 2);
        assert!(service.get_children(&root).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_before_first_child() -> Result<()> {
        let (service, _temp_dir) = create_ordered_service().await?;

        let root = create_node(&service, "Root", None).await?;
        let first = create_node(&service, "First", Some(&root)).await?;
        let second = create_node(&service, "Second", Some(&root)).await?;
        let third = create_node(&service, "Third", Some(&root)).await?;

        service.make_previous_sibling_of(&third, &first).await?;

        assert_eq!(refresh(&service, &third).await?.order, Some(1));
        assert_eq!(refresh(&service, &first).await?.order, Some(2));
        assert_eq!(refresh(&service, &second).await?.order, Some(3));
        Ok(())
    }

    #[tokio::test]
    async fn test_root_cannot_become_its_own_child() -> Result<()> {
        let (service, _temp_dir) = create_ordered_service().await?;
        let root = create_node(&service, "Root", None).await?;

        let result = service.make_child_of(&root, &root).await;
        assert!(matches!(result, Err(TreeError::MoveNotPossible { .. })));

        let stored = refresh(&service, &root).await?;
        assert_eq!(stored.parent_key, None);
        assert_eq!(stored.path, "");
        assert_eq!(stored.depth, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_node_cannot_move_under_its_descendant() -> Result<()> {
        let (service, _temp_dir) = create_ordered_service().await?;
        let root = create_node(&service, "Root", None).await?;
        let child = create_node(&service, "Child", Some(&root)).await?;
        let leaf = create_node(&service, "Leaf", Some(&child)).await?;

        let result = service.make_child_of(&root, &leaf).await;
        assert!(matches!(result, Err(TreeError::MoveNotPossible { .. })));

        assert_eq!(refresh(&service, &root).await?, root);
        assert_eq!(refresh(&service, &leaf).await?.path, leaf.path);
        Ok(())
    }

    #[tokio::test]
    async fn test_move_to_unknown_key_is_not_found() -> Result<()> {
        let (service, _temp_dir) = create_ordered_service().await?;
        let root = create_node(&service, "Root", None).await?;

        let result = service.make_child_of_key(&root, "does-not-exist").await;
        assert!(matches!(result, Err(TreeError::NotFound { key }) if key == "does-not-exist"));
        Ok(())
    }

    #[tokio::test]
    async fn test_hierarchy_of_two_trees() -> Result<()> {
        let (service, _temp_dir) = create_unordered_service().await?;

        let a = create_node(&service, "A", None).await?;
        let b = create_node(&service, "B", Some(&a)).await?;
        let c = create_node(&service, "C", Some(&b)).await?;
        let d = create_node(&service, "D", None).await?;

        let forest = service.to_hierarchy(vec![a.clone(), b.clone(), c.clone(), d.clone()]);

        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].node.key, a.key);
        assert_eq!(forest[1].node.key, d.key);
        assert_eq!(forest[0].children.len(), 1);
        assert_eq!(forest[0].children[0].node.key, b.key);
        assert_eq!(forest[0].children[0].children[0].node.key, c.key);
        assert!(forest[1].children.is_empty());

        assert_eq!(flatten_forest(forest), vec![a, b, c, d]);
        Ok(())
    }

    #[tokio::test]
    async fn test_stored_hierarchy_keeps_sibling_order() -> Result<()> {
        let (service, _temp_dir) = create_ordered_service().await?;

        let root = create_node(&service, "Root folder", None).await?;
        let subfolder = create_node(&service, "Subfolder", Some(&root)).await?;
        create_node(&service, "Child folder", Some(&subfolder)).await?;
        let second_root = create_node(&service, "Second Root", None).await?;
        let late = create_node(&service, "Late", Some(&root)).await?;
        create_node(&service, "Second subfolder", Some(&second_root)).await?;

        service.make_previous_sibling_of(&late, &subfolder).await?;

        let forest = service.get_hierarchy().await?;
        assert_eq!(forest.len(), 2);

        let names: Vec<&str> = forest[0]
            .children
            .iter()
            .map(|h| h.node.name.as_str())
            .collect();
        assert_eq!(names, vec!["Late", "Subfolder"]);
        assert_eq!(forest[0].children[1].children[0].node.name, "Child folder");
        Ok(())
    }

    #[tokio::test]
    async fn test_custom_key_validation() -> Result<()> {
        let (service, _temp_dir) = create_ordered_service().await?;

        let node = TreeNode::new_with_key("has/slash".into(), "x".into(), None, json!({}));
        assert!(matches!(
            service.create(node).await,
            Err(TreeError::Validation(_))
        ));
        Ok(())
    }
}

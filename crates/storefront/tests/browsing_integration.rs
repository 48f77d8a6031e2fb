//! Integration tests for the client-held state that feeds checkout:
//! cart and referral capture persisted on disk, plus affiliate resolution
//! against the document store.

use document_store::{DocumentStoreExt, InMemoryDocumentStore, collections};
use storefront::{
    Affiliate, AffiliateId, AffiliateResolver, CartLedger, FileLocalStore, LineKey, Money,
    Product, ProductId, ReferralTracker,
};

fn tee(price_cents: i64) -> Product {
    Product {
        name: "Camiseta Básica".into(),
        price: Money::from_cents(price_cents),
        stock: 5,
        images: vec!["tee.jpg".into()],
        sizes: vec!["M".into(), "G".into()],
        colors: vec!["Branco".into()],
        category: "camisetas".into(),
        description: "Algodão".into(),
    }
}

mod local_state {
    use super::*;

    #[test]
    fn cart_and_referral_survive_restart() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = FileLocalStore::open(dir.path()).unwrap();
            let mut cart = CartLedger::load(store.clone()).unwrap();
            cart.add_item(ProductId::new("tee"), &tee(5000), "M", "Branco", 2)
                .unwrap();
            cart.add_item(ProductId::new("tee"), &tee(5000), "G", "Branco", 1)
                .unwrap();
            ReferralTracker::new(store).capture("BIA10").unwrap();
        }

        let store = FileLocalStore::open(dir.path()).unwrap();
        let cart = CartLedger::load(store.clone()).unwrap();
        let tracker = ReferralTracker::new(store);

        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.total(), Money::from_reais(150));
        assert_eq!(
            cart.line(&LineKey::new(ProductId::new("tee"), "M", "Branco"))
                .map(|l| l.quantity),
            Some(2)
        );
        assert_eq!(tracker.peek().unwrap().unwrap().as_str(), "BIA10");
    }

    #[test]
    fn cart_line_keeps_price_seen_at_add_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut cart = CartLedger::load(FileLocalStore::open(dir.path()).unwrap()).unwrap();

        cart.add_item(ProductId::new("tee"), &tee(5000), "M", "Branco", 1)
            .unwrap();
        // A later price change only affects the display fields of new lines.
        cart.add_item(ProductId::new("tee"), &tee(6000), "M", "Branco", 1)
            .unwrap();

        assert_eq!(cart.total(), Money::from_reais(100));
    }
}

mod attribution {
    use super::*;

    #[tokio::test]
    async fn captured_code_resolves_to_affiliate() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ReferralTracker::new(FileLocalStore::open(dir.path()).unwrap());
        tracker.capture("BIA10").unwrap();

        let docs = InMemoryDocumentStore::new();
        docs.create_from(
            collections::AFFILIATES,
            Some(AffiliateId::new("aff-1")),
            &Affiliate::new("Bia", "BIA10"),
        )
        .await
        .unwrap();

        let resolver = AffiliateResolver::new(docs);
        let code = tracker.peek().unwrap().unwrap();
        let resolved = resolver.resolve(code.as_str()).await.unwrap().unwrap();

        assert_eq!(resolved.id, AffiliateId::new("aff-1"));
        assert_eq!(
            resolved.commission_on(Money::from_reais(200)),
            Money::from_reais(20)
        );
        // Peeking does not consume.
        assert!(tracker.peek().unwrap().is_some());
    }
}

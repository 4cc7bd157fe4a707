//! # Seed Data Generator
//!
//! Populates an empty store with sample data for development.
//!
//! ## Usage
//! ```bash
//! # 200 products (default)
//! tienda-admin seed
//!
//! # Custom amount
//! tienda-admin seed --count 2000
//! ```
//!
//! ## Generated Data
//! - One supplier per category, with a flat shipping cost
//! - Products across categories (almacén, bebidas, limpieza, lácteos,
//!   mascotas), each with a unique 12-digit code, random price and stock
//! - One combo per twenty products, bundling two or three of them
//!
//! Nothing is written when the store already has products.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

use tienda_core::validation::random_code;
use tienda_core::{ComboItem, NewCombo, NewProduct, NewSupplier};
use tienda_db::{Database, DbResult};

/// Categories: supplier name, shipping cost and product names.
const CATEGORIES: &[(&str, i64, &[&str])] = &[
    (
        "Distribuidora Almacén",
        150_000,
        &[
            "Yerba Mate",
            "Azúcar",
            "Harina 000",
            "Arroz Largo Fino",
            "Fideos Tallarines",
            "Fideos Mostachol",
            "Aceite de Girasol",
            "Puré de Tomate",
            "Lentejas",
            "Polenta",
            "Galletitas de Agua",
            "Dulce de Leche",
        ],
    ),
    (
        "Bebidas del Centro",
        200_000,
        &[
            "Agua Mineral",
            "Agua con Gas",
            "Gaseosa Cola",
            "Gaseosa Lima Limón",
            "Jugo de Naranja",
            "Soda en Sifón",
            "Cerveza Rubia",
            "Vino Tinto",
            "Amargo Serrano",
            "Café Molido",
        ],
    ),
    (
        "Limpieza Total",
        120_000,
        &[
            "Lavandina",
            "Detergente",
            "Jabón en Polvo",
            "Suavizante",
            "Limpiador de Pisos",
            "Esponja",
            "Rejilla",
            "Bolsas de Residuos",
        ],
    ),
    (
        "Lácteos La Vaquita",
        180_000,
        &[
            "Leche Entera",
            "Leche Descremada",
            "Yogur Bebible",
            "Queso Cremoso",
            "Queso Rallado",
            "Manteca",
            "Crema de Leche",
            "Ricota",
        ],
    ),
    (
        "Mascotas Feliz",
        100_000,
        &[
            "Alimento Perro Adulto",
            "Alimento Gato",
            "Piedras Sanitarias",
            "Snack Canino",
            "Collar",
        ],
    ),
];

const SIZES: &[&str] = &["250g", "500g", "1kg", "500ml", "1L", "1.5L", "2L", "x6"];

/// What a seed run wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub suppliers: usize,
    pub products: usize,
    pub combos: usize,
}

/// Seeds `count` products, their suppliers and a few combos.
///
/// Returns `None` when the store already has products.
pub async fn run<R: Rng>(db: &Database, count: usize, rng: &mut R) -> DbResult<Option<SeedReport>> {
    let existing = db.products().count().await?;
    if existing > 0 {
        info!(existing, "Store already has products, skipping seed");
        return Ok(None);
    }

    let mut supplier_ids = Vec::with_capacity(CATEGORIES.len());
    for (name, shipping, _) in CATEGORIES {
        let supplier = db
            .suppliers()
            .insert(&NewSupplier {
                name: name.to_string(),
                shipping_cost_cents: *shipping,
                ..Default::default()
            })
            .await?;
        supplier_ids.push(supplier.id);
    }

    let products = sample_products(count, &supplier_ids, rng);
    let imported = db.products().import(&products).await?;

    let mut product_ids: Vec<i64> = db.products().list().await?.iter().map(|p| p.id).collect();
    let mut taken: HashSet<String> = products.into_iter().map(|p| p.code).collect();

    let combo_count = if product_ids.len() >= 2 { (count / 20).max(1) } else { 0 };
    for index in 0..combo_count {
        product_ids.shuffle(rng);
        let size = rng.gen_range(2..=3).min(product_ids.len());
        let components = product_ids[..size]
            .iter()
            .map(|&id| ComboItem::new(id, rng.gen_range(1..=3)))
            .collect();

        db.combos()
            .insert(&NewCombo {
                name: format!("Combo Ahorro {}", index + 1),
                description: Some("Combo de muestra".to_string()),
                price_cents: rng.gen_range(5_000..=30_000) * 100,
                code: fresh_code(&mut taken, rng),
                components,
            })
            .await?;
    }

    let report = SeedReport {
        suppliers: supplier_ids.len(),
        products: imported,
        combos: combo_count,
    };
    info!(
        suppliers = report.suppliers,
        products = report.products,
        combos = report.combos,
        "Seed complete"
    );
    Ok(Some(report))
}

fn sample_products<R: Rng>(count: usize, supplier_ids: &[i64], rng: &mut R) -> Vec<NewProduct> {
    let mut taken = HashSet::with_capacity(count);

    (0..count)
        .map(|i| {
            let category = i % CATEGORIES.len();
            let (_, _, names) = CATEGORIES[category];
            let name = names[(i / CATEGORIES.len()) % names.len()];
            let size = SIZES[rng.gen_range(0..SIZES.len())];

            // $100.00 - $20,000.00
            let price_cents = rng.gen_range(100..=20_000) * 100;

            NewProduct {
                name: format!("{name} {size}"),
                description: None,
                price_cents,
                cost_price_cents: price_cents * 60 / 100,
                wholesale_price_cents: price_cents * 85 / 100,
                code: fresh_code(&mut taken, rng),
                supplier_code: Some(format!("P{:03}-{:05}", category + 1, i + 1)),
                stock: rng.gen_range(0..=100),
                supplier_id: supplier_ids.get(category).copied(),
            }
        })
        .collect()
}

fn fresh_code<R: Rng>(taken: &mut HashSet<String>, rng: &mut R) -> String {
    loop {
        let code = random_code(rng);
        if taken.insert(code.clone()) {
            return code;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tienda_db::DbConfig;

    #[tokio::test]
    async fn test_seed_then_skip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let report = run(&db, 40, &mut rng).await.unwrap().unwrap();
        assert_eq!(report.suppliers, CATEGORIES.len());
        assert_eq!(report.products, 40);
        assert_eq!(report.combos, 2);

        assert_eq!(db.products().count().await.unwrap(), 40);
        let combos = db.combos().list().await.unwrap();
        assert_eq!(combos.len(), 2);
        assert!(combos.iter().all(|c| c.components.len() >= 2));

        assert!(run(&db, 40, &mut rng).await.unwrap().is_none());
        assert_eq!(db.products().count().await.unwrap(), 40);
    }

    #[test]
    fn test_sample_products_have_distinct_codes() {
        let mut rng = StdRng::seed_from_u64(1);
        let products = sample_products(500, &[1, 2, 3, 4, 5], &mut rng);

        let codes: HashSet<&str> = products.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(codes.len(), 500);
        assert!(products.iter().all(|p| p.cost_price_cents < p.price_cents));
        assert_eq!(products[1].supplier_id, Some(2));
    }
}

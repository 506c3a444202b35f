//! Products a source can open

/// A known product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Product {
    /// Patch server product code
    pub code: &'static str,
    /// Display title
    pub title: &'static str,
    /// Short tag
    pub tag: &'static str,
}

/// Every product the sources recognise, in display order
pub const PRODUCTS: &[Product] = &[
    Product { code: "wow", title: "World of Warcraft", tag: "Retail" },
    Product { code: "wowt", title: "PTR: World of Warcraft", tag: "PTR" },
    Product { code: "wowxptr", title: "PTR 2: World of Warcraft", tag: "PTR 2" },
    Product { code: "wow_beta", title: "Beta: World of Warcraft", tag: "Beta" },
    Product { code: "wow_classic", title: "World of Warcraft Classic", tag: "Classic" },
    Product { code: "wow_classic_beta", title: "Beta: World of Warcraft Classic", tag: "Classic Beta" },
    Product { code: "wow_classic_ptr", title: "PTR: World of Warcraft Classic", tag: "Classic PTR" },
    Product { code: "wow_classic_era", title: "World of Warcraft Classic Era", tag: "Classic Era" },
    Product { code: "wow_classic_era_ptr", title: "PTR: World of Warcraft Classic Era", tag: "Classic Era PTR" },
    Product { code: "wow_classic_titan", title: "World of Warcraft Classic Titan Reforged", tag: "Classic Titan" },
];

/// Look up a product by code
pub fn find_product(code: &str) -> Option<&'static Product> {
    PRODUCTS.iter().find(|p| p.code == code)
}

//! Per-command page metadata.
//!
//! Each view declares its title and description once; the command layer
//! renders the header instead of every view writing its own.

pub struct PageMeta {
    pub title: &'static str,
    pub description: &'static str,
}

impl PageMeta {
    pub fn full_title(&self) -> String {
        format!("{} | Circulapp", self.title)
    }

    /// Print the page header.
    pub fn render(&self) {
        println!("\n{}", self.full_title());
        println!("{}", self.description);
        println!("{:-<60}", "");
    }
}

pub const MARKETPLACE: PageMeta = PageMeta {
    title: "Marketplace",
    description: "Explora ítems reutilizables disponibles en tu comunidad.",
};

pub const ITEM_DETAIL: PageMeta = PageMeta {
    title: "Detalle del ítem",
    description: "Información del ítem publicado.",
};

pub const PUBLISH_ITEM: PageMeta = PageMeta {
    title: "Publicar Ítem",
    description: "Publica ítems reutilizables en tu comunidad y contribuye a la economía circular.",
};

pub const EDIT_ITEM: PageMeta = PageMeta {
    title: "Editar Ítem",
    description: "Actualiza los datos de tu publicación.",
};

pub const MY_PROFILE: PageMeta = PageMeta {
    title: "Mi Perfil",
    description: "Gestiona tu perfil, estadísticas y ítems publicados en Circulapp.",
};

pub const CHATS: PageMeta = PageMeta {
    title: "Chats",
    description: "Tus conversaciones con otros miembros de la comunidad.",
};

pub const SIGN_IN: PageMeta = PageMeta {
    title: "Acceder",
    description: "Únete a Circulapp: la comunidad de economía circular.",
};
